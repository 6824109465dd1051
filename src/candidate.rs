//! Catalog entries turned into structured, scoreable candidates.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, CatalogResponse};
use crate::extract::{extract_pack_grams, extract_per_grams, extract_per_ml, parse_nutrition};

/// Calories (kcal) and macros (g).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Nutrition {
    pub fn is_finite(&self) -> bool {
        self.calories.is_finite()
            && self.protein.is_finite()
            && self.carbs.is_finite()
            && self.fat.is_finite()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
        }
    }

    /// Calories to the nearest integer, macros to one decimal place.
    pub fn rounded(&self) -> Self {
        Self {
            calories: self.calories.round(),
            protein: round1(self.protein),
            carbs: round1(self.carbs),
            fat: round1(self.fat),
        }
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One parsed catalog entry.
///
/// Built only through [`build_candidates`], which guarantees `nutrition` came
/// from a well-formed description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub description: String,
    pub nutrition: Nutrition,
    /// Gram basis the nutrition is stated per ("Per 100g").
    pub per_grams: Option<f64>,
    /// Millilitre basis the nutrition is stated per ("Per 330ml").
    pub per_ml: Option<f64>,
    /// Pack size taken from the name ("(45g)"); secondary scaling basis only.
    pub pack_grams: Option<f64>,
}

impl Candidate {
    pub fn from_entry(entry: &CatalogEntry) -> Option<Self> {
        let nutrition = parse_nutrition(&entry.food_description)?;
        let brand = entry
            .brand_name
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);

        Some(Self {
            id: entry.food_id.clone(),
            name: entry.food_name.trim().to_string(),
            brand,
            description: entry.food_description.trim().to_string(),
            nutrition,
            per_grams: extract_per_grams(&entry.food_description),
            per_ml: extract_per_ml(&entry.food_description),
            pack_grams: extract_pack_grams(&entry.food_name),
        })
    }

    /// Brand, name and description joined; the text scored and gated against.
    pub fn combined_text(&self) -> String {
        match &self.brand {
            Some(brand) => format!("{} {} {}", brand, self.name, self.description),
            None => format!("{} {}", self.name, self.description),
        }
    }

    /// "Brand Name" or "Name".
    pub fn display_name(&self) -> String {
        match &self.brand {
            Some(brand) => format!("{} {}", brand, self.name),
            None => self.name.clone(),
        }
    }
}

/// Parse a catalog response into candidates, keeping catalog order.
///
/// Entries whose description does not parse are dropped.
pub fn build_candidates(response: &CatalogResponse) -> Vec<Candidate> {
    response
        .entries()
        .iter()
        .filter_map(Candidate::from_entry)
        .collect()
}
