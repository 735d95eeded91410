//! Model triple, score combination and artifact loading

pub mod classifier;
pub mod combiner;
pub mod ensemble;
pub mod loader;

pub use classifier::{Classifier, OnnxClassifier};
pub use combiner::ScoreCombiner;
pub use ensemble::{ModelState, ModelTriple};
pub use loader::{ArtifactBundle, ArtifactManifest, ModelLoader};
