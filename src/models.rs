//! Data models for ingredients, pre-recipes and dishes

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard units an ingredient or pre-recipe is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitType {
    #[serde(rename = "kg")]
    Kg,
    #[serde(rename = "gr")]
    Gr,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "ml")]
    Ml,
    #[serde(rename = "un")]
    Unit,
    #[serde(rename = "lb")]
    Lb,
    #[serde(rename = "oz")]
    Oz,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Kg => "kg",
            UnitType::Gr => "gr",
            UnitType::L => "L",
            UnitType::Ml => "ml",
            UnitType::Unit => "un",
            UnitType::Lb => "lb",
            UnitType::Oz => "oz",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for UnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kg" => Ok(UnitType::Kg),
            "gr" | "g" => Ok(UnitType::Gr),
            "l" => Ok(UnitType::L),
            "ml" => Ok(UnitType::Ml),
            "un" | "unit" => Ok(UnitType::Unit),
            "lb" => Ok(UnitType::Lb),
            "oz" => Ok(UnitType::Oz),
            other => Err(format!("unknown unit '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub category: String,
    pub purchase_unit: String, // e.g. "Sack 25kg"
    pub standard_unit: UnitType,
    /// Standard units contained in one purchase unit
    pub conversion_factor: f64,
    /// Fraction lost in processing, 0 <= waste < 1
    pub waste_factor: f64,
    pub current_stock: f64, // standard units
    pub min_stock: f64,     // standard units
    /// Money per purchase unit
    pub weighted_average_cost: f64,
    /// WAC before the most recent purchase, only used for alerts
    pub last_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    Ingredient,
    PreRecipe,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Ingredient => "ingredient",
            ComponentKind::PreRecipe => "pre-recipe",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingredient" | "ing" | "i" => Ok(ComponentKind::Ingredient),
            "pre-recipe" | "prerecipe" | "pre" | "p" => Ok(ComponentKind::PreRecipe),
            other => Err(format!("unknown component type '{}'", other)),
        }
    }
}

/// One bill-of-materials line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// In standard units of the referenced item
    pub quantity: f64,
}

impl RecipeComponent {
    pub fn ingredient(id: impl Into<String>, quantity: f64) -> Self {
        Self {
            id: id.into(),
            kind: ComponentKind::Ingredient,
            quantity,
        }
    }

    pub fn pre_recipe(id: impl Into<String>, quantity: f64) -> Self {
        Self {
            id: id.into(),
            kind: ComponentKind::PreRecipe,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreRecipe {
    pub id: String,
    pub name: String,
    pub unit: UnitType,
    /// Batch output in `unit`
    pub yield_quantity: f64,
    pub components: Vec<RecipeComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: String,
    pub name: String,
    pub category: String,
    pub preparation_time_minutes: f64,
    pub components: Vec<RecipeComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_margin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    pub hourly_labor_rate: f64,
    pub indirect_cost_percentage: f64,
    pub default_margin: f64,
    pub default_tax_rate: f64,
    pub currency: String,
    pub cost_alert_threshold: f64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            hourly_labor_rate: 15.0,
            indirect_cost_percentage: 25.0,
            default_margin: 30.0,
            default_tax_rate: 16.0,
            currency: "USD".to_string(),
            cost_alert_threshold: 10.0,
        }
    }
}

/// Result of pricing a dish. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedCost {
    pub cni: f64,
    pub cmo: f64,
    pub coi: f64,
    pub base_cost: f64,
    /// Display approximation only, not the pre-tax inverse of the margin step
    pub suggested_price: f64,
    /// 0 when the tax rate makes the dish unpriceable
    pub final_price: f64,
}

impl CalculatedCost {
    /// Margin slice shown in the price breakdown
    pub fn margin_amount(&self, tax_rate: f64) -> f64 {
        self.final_price - self.base_cost - self.final_price * (tax_rate / 100.0)
    }
}

/// A recorded purchase of one ingredient
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLog {
    pub id: i64,
    pub ingredient_id: String,
    pub date: DateTime<Utc>,
    pub quantity: f64, // purchase units
    pub total_cost: f64,
    pub supplier: Option<String>,
}

pub type IngredientTable = BTreeMap<String, Ingredient>;
pub type PreRecipeTable = BTreeMap<String, PreRecipe>;
pub type DishTable = BTreeMap<String, Dish>;

/// Line of a cost breakdown tree
#[derive(Debug, Clone)]
pub struct CostNode {
    pub id: String,
    pub name: String,
    pub kind: ComponentKind,
    pub quantity: f64,
    pub unit: Option<UnitType>,
    /// Cost per standard (or output) unit
    pub unit_cost: f64,
    pub line_cost: f64,
    pub status: NodeStatus,
    pub children: Vec<CostNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Resolved,
    Missing,
    Cycle,
}
