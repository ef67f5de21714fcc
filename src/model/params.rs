use burn::module::{Module, ModuleMapper, ModuleVisitor, Param};
use burn::prelude::*;

/// Sets `require_grad` on every float parameter of a module.
struct RequireGrad(bool);

impl<B: Backend> ModuleMapper<B> for RequireGrad {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let (id, tensor, mapper) = param.consume();
        Param::from_mapped_value(id, tensor.set_require_grad(self.0), mapper)
    }
}

#[derive(Default)]
struct TrainableCounter {
    trainable: usize,
    total: usize,
}

impl<B: Backend> ModuleVisitor<B> for TrainableCounter {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.total += 1;
        if param.val().is_require_grad() {
            self.trainable += 1;
        }
    }
}

/// A group of parameters whose trainability can be switched as a unit.
///
/// A frozen group still passes gradients through to its inputs, but none of
/// its own parameters are tracked, so backward never produces gradients for
/// them.
pub trait ParamGroup<B: Backend>: Module<B> {
    fn freeze(self) -> Self {
        self.map(&mut RequireGrad(false))
    }

    fn unfreeze(self) -> Self {
        self.map(&mut RequireGrad(true))
    }

    /// `(trainable, total)` float parameter counts.
    fn trainable_params(&self) -> (usize, usize) {
        let mut counter = TrainableCounter::default();
        self.visit(&mut counter);
        (counter.trainable, counter.total)
    }

    fn is_frozen(&self) -> bool {
        self.trainable_params().0 == 0
    }
}

impl<B: Backend, M: Module<B>> ParamGroup<B> for M {}
