use async_trait::async_trait;

use crate::context::Context;
use crate::error::StageError;
use crate::value::PipelineValue;

/// Outcome of one pipeline function.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Hand the (possibly empty) output to the next function.
    Continue(Option<PipelineValue>),
    /// End the pipeline cleanly at this function.
    Halt,
}

pub type FunctionResult = Result<Flow, StageError>;

/// One composable transform in a function pipeline.
///
/// Functions carry a stable identifier so the pipeline identity can be
/// derived from the ordered list of transforms; hashing closures by
/// address would not survive a restart.
#[async_trait]
pub trait AppFunction: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, ctx: &mut Context, input: Option<PipelineValue>) -> FunctionResult;
}

/// Adapter turning a plain closure into an [`AppFunction`] under an
/// explicit identifier.
pub struct FnTransform<F> {
    id: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&mut Context, Option<PipelineValue>) -> FunctionResult + Send + Sync,
{
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> AppFunction for FnTransform<F>
where
    F: Fn(&mut Context, Option<PipelineValue>) -> FunctionResult + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &mut Context, input: Option<PipelineValue>) -> FunctionResult {
        (self.func)(ctx, input)
    }
}
