use serde_json::json;

use crate::core::error::Result;
use crate::core::tool::{MethodDescriptor, ParamKind, Tool};

/// Integer arithmetic, the reference tool.
pub struct Arithmetic;

impl Arithmetic {
    pub const NAME: &'static str = "Arithmetic";

    pub fn tool() -> Result<Tool> {
        Tool::builder(Self::NAME)
            .method(
                MethodDescriptor::new("add", "Returns the sum of x and y")
                    .param("x", ParamKind::Int)
                    .param("y", ParamKind::Int)
                    .returns(ParamKind::Int),
                |args| Ok(json!(args.int("x")?.saturating_add(args.int("y")?))),
            )
            .method(
                MethodDescriptor::new("subtract", "Returns x minus y")
                    .param("x", ParamKind::Int)
                    .param("y", ParamKind::Int)
                    .returns(ParamKind::Int),
                |args| Ok(json!(args.int("x")?.saturating_sub(args.int("y")?))),
            )
            .build()
    }
}
