//! Test doubles for code built on [`LanguageModel`](crate::LanguageModel).

mod model;

pub use model::{
    text_partial, MockGenerateResult, MockLanguageModel, MockResponder, MockStreamResult,
    MockStreamSender,
};
