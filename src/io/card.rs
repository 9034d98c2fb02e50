//! Model card loading.
//!
//! The card is the feature schema every other component depends on, so any
//! problem here is a `Config` error and the service refuses to start.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use crate::domain::ModelCard;
use crate::error::AppError;

/// Read and validate a model card JSON file.
pub fn read_model_card(path: &Path) -> Result<ModelCard, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Config(format!("failed to open model card '{}': {e}", path.display())))?;
    let card: ModelCard = serde_json::from_reader(file)
        .map_err(|e| AppError::Config(format!("invalid model card '{}': {e}", path.display())))?;
    validate_card(&card)?;
    Ok(card)
}

pub fn validate_card(card: &ModelCard) -> Result<(), AppError> {
    if card.features.is_empty() {
        return Err(AppError::Config("model card declares no features".to_string()));
    }
    let mut seen = HashSet::new();
    for name in &card.features {
        if !seen.insert(name.as_str()) {
            return Err(AppError::Config(format!("duplicate feature in model card: `{name}`")));
        }
    }
    if card.target.is_empty() {
        return Err(AppError::Config("model card target column name is empty".to_string()));
    }
    if seen.contains(card.target.as_str()) {
        return Err(AppError::Config(format!(
            "target column `{}` is also listed as a feature",
            card.target
        )));
    }
    Ok(())
}
