pub mod features;
pub mod encoder;
pub mod dataset;
pub mod gbdt;
pub mod metrics;
pub mod tuning;
pub mod trainer;
pub mod persistence;
pub mod inference;

pub use dataset::{Dataset, DatasetBuilder, TrainTestSplit};
pub use encoder::AssetEncoder;
pub use features::{feature_names, Direction, FeatureAssembler, FeatureFrame, MarketContext};
pub use inference::{ModelHandle, Prediction, PredictionOutput};
pub use metrics::EvaluationMetrics;
pub use persistence::{ArtifactWriter, ModelArtifacts, ModelMetadata};
pub use trainer::{train_model, TrainedModel};
