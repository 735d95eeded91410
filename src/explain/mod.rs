//! Local explanations for risk decisions

pub mod kernel_shap;
pub mod ranker;

pub use kernel_shap::{Attribution, KernelExplainer};
pub use ranker::{ExplanationRanker, FALLBACK_REASON};
