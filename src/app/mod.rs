pub mod ingestion_use_case;
pub mod ports;
pub mod prediction_use_case;
pub mod training_use_case;
