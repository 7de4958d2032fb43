use std::sync::Arc;

use serde_json::Value;
use sf_core::{ScenarioError, ValueMap};

use super::{
    finish_number, list_param, required, to_number, FunctionExecutor, FunctionRegistry,
    FUNCTION_DIVISION_BY_ZERO, FUNCTION_MISSING_PARAM,
};
use crate::context::ExecutionContext;
use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FoldOp {
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl FoldOp {
    fn name(self) -> &'static str {
        match self {
            Self::Plus => "Plus",
            Self::Minus => "Minus",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
        }
    }
}

fn division_by_zero() -> ScenarioError {
    ScenarioError::evaluation(FUNCTION_DIVISION_BY_ZERO, "division by zero")
}

/// Left-to-right fold over `values`.
struct Fold(FoldOp);

impl Fold {
    fn apply(&self, operands: &[f64]) -> Result<f64, ScenarioError> {
        let op = self.0;
        let Some((first, rest)) = operands.split_first() else {
            return match op {
                FoldOp::Plus | FoldOp::Minus => Ok(0.0),
                FoldOp::Multiply => Ok(1.0),
                FoldOp::Divide => Err(ScenarioError::evaluation(
                    FUNCTION_MISSING_PARAM,
                    "Divide requires at least one operand.",
                )),
            };
        };
        if rest.is_empty() {
            return match op {
                FoldOp::Minus => Ok(-first),
                FoldOp::Divide if *first == 0.0 => Err(division_by_zero()),
                FoldOp::Divide => Ok(1.0 / first),
                FoldOp::Plus | FoldOp::Multiply => Ok(*first),
            };
        }
        let mut acc = *first;
        for operand in rest {
            acc = match op {
                FoldOp::Plus => acc + operand,
                FoldOp::Minus => acc - operand,
                FoldOp::Multiply => acc * operand,
                FoldOp::Divide if *operand == 0.0 => return Err(division_by_zero()),
                FoldOp::Divide => acc / operand,
            };
        }
        Ok(acc)
    }
}

impl FunctionExecutor for Fold {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let name = self.0.name();
        let operands = list_param(&params, "values")
            .iter()
            .map(|value| to_number(value, name))
            .collect::<Result<Vec<_>, _>>()?;
        finish_number(self.apply(&operands)?, name)
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["values"]
    }
}

struct Mod;

impl FunctionExecutor for Mod {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let dividend = to_number(required(&params, "dividend", "Mod")?, "Mod")?;
        let divisor = to_number(required(&params, "divisor", "Mod")?, "Mod")?;
        if divisor == 0.0 {
            return Err(division_by_zero());
        }
        finish_number(dividend % divisor, "Mod")
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["dividend", "divisor"]
    }
}

pub(super) fn register(registry: &FunctionRegistry) {
    for op in [
        FoldOp::Plus,
        FoldOp::Minus,
        FoldOp::Multiply,
        FoldOp::Divide,
    ] {
        registry.install(op.name(), Arc::new(Fold(op)));
    }
    registry.install("Mod", Arc::new(Mod));
}
