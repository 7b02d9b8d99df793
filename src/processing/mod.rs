pub mod channel_classification;
pub mod layer_export;
