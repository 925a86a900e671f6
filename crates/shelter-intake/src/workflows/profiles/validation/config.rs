use serde::{Deserialize, Serialize};

/// Thresholds applied by the validation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub min_description_chars: usize,
    pub min_gallery_images: usize,
    pub min_size_cm: u32,
    pub max_size_cm: u32,
    pub earliest_birth_year: i32,
    pub earliest_seeking_home_year: i32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_description_chars: 20,
            min_gallery_images: 1,
            min_size_cm: 1,
            max_size_cm: 200,
            earliest_birth_year: 1990,
            earliest_seeking_home_year: 2000,
        }
    }
}
