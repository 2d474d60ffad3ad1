//! Dish pricing: ingredient, labor and overhead cost, then margin and tax

use tracing::{debug, warn};

use crate::calculator::Resolver;
use crate::error::{CostError, CostWarning, Costed};
use crate::models::{CalculatedCost, Dish, DishTable, GlobalSettings, IngredientTable, PreRecipeTable};

/// Margin and tax percentages in force for one dish
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingPolicy {
    pub margin: f64,
    pub tax_rate: f64,
}

impl PricingPolicy {
    /// Per-dish overrides win over the global defaults
    pub fn resolve(dish: &Dish, settings: &GlobalSettings) -> Self {
        Self {
            margin: dish.target_margin.unwrap_or(settings.default_margin),
            tax_rate: dish.tax_rate.unwrap_or(settings.default_tax_rate),
        }
    }

    pub fn margin_multiplier(&self) -> f64 {
        1.0 + self.margin / 100.0
    }

    pub fn tax_divisor(&self) -> f64 {
        1.0 - self.tax_rate / 100.0
    }
}

/// Labor cost (CMO) for a preparation time in minutes
pub fn labor_cost(preparation_time_minutes: f64, settings: &GlobalSettings) -> f64 {
    (settings.hourly_labor_rate / 60.0) * preparation_time_minutes
}

/// Overhead (COI), proportional to ingredient cost only
pub fn overhead_cost(cni: f64, settings: &GlobalSettings) -> f64 {
    cni * (settings.indirect_cost_percentage / 100.0)
}

/// Price a dish from its current components and the given settings
pub fn price(
    dish: &Dish,
    ingredients: &IngredientTable,
    pre_recipes: &PreRecipeTable,
    settings: &GlobalSettings,
) -> Result<CalculatedCost, CostError> {
    price_with_warnings(dish, ingredients, pre_recipes, settings).map(|costed| costed.value)
}

pub fn price_with_warnings(
    dish: &Dish,
    ingredients: &IngredientTable,
    pre_recipes: &PreRecipeTable,
    settings: &GlobalSettings,
) -> Result<Costed<CalculatedCost>, CostError> {
    let mut resolver = Resolver::new(ingredients, pre_recipes);
    let cni = resolver.components_cost(&dish.components)?;
    let mut warnings = resolver.into_warnings();

    let policy = PricingPolicy::resolve(dish, settings);
    let cost = finish_price(cni, dish.preparation_time_minutes, &policy, settings);

    if policy.tax_divisor() <= 0.0 {
        warn!(dish = %dish.id, tax_rate = policy.tax_rate, "tax rate leaves dish unpriceable");
        warnings.push(CostWarning::Unpriceable {
            dish: dish.id.clone(),
            tax_rate: policy.tax_rate,
        });
    }

    debug!(dish = %dish.id, base_cost = cost.base_cost, final_price = cost.final_price, "priced dish");
    Ok(Costed {
        value: cost,
        warnings,
    })
}

fn finish_price(
    cni: f64,
    preparation_time_minutes: f64,
    policy: &PricingPolicy,
    settings: &GlobalSettings,
) -> CalculatedCost {
    let cmo = labor_cost(preparation_time_minutes, settings);
    let coi = overhead_cost(cni, settings);
    let base_cost = cni + cmo + coi;

    let tax_divisor = policy.tax_divisor();
    let final_price = if tax_divisor > 0.0 {
        (base_cost * policy.margin_multiplier()) / tax_divisor
    } else {
        0.0
    };
    let suggested_price = final_price * (1.0 - policy.tax_rate / 100.0);

    CalculatedCost {
        cni,
        cmo,
        coi,
        base_cost,
        suggested_price,
        final_price,
    }
}

/// Price every dish. A failure on one dish never affects the others.
pub fn price_menu(
    dishes: &DishTable,
    ingredients: &IngredientTable,
    pre_recipes: &PreRecipeTable,
    settings: &GlobalSettings,
) -> Vec<(String, Result<Costed<CalculatedCost>, CostError>)> {
    dishes
        .values()
        .map(|dish| {
            (
                dish.id.clone(),
                price_with_warnings(dish, ingredients, pre_recipes, settings),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ingredient, PreRecipe, RecipeComponent, UnitType};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn dish(components: Vec<RecipeComponent>, minutes: f64) -> Dish {
        Dish {
            id: "d1".to_string(),
            name: "Pasta".to_string(),
            category: "Main".to_string(),
            preparation_time_minutes: minutes,
            components,
            target_margin: None,
            tax_rate: None,
        }
    }

    /// Single ingredient costing exactly 1 per kg
    fn unit_ingredient() -> IngredientTable {
        let ingredient = Ingredient {
            id: "i".to_string(),
            name: "Unit".to_string(),
            category: "Test".to_string(),
            purchase_unit: "kg".to_string(),
            standard_unit: UnitType::Kg,
            conversion_factor: 1.0,
            waste_factor: 0.0,
            current_stock: 0.0,
            min_stock: 0.0,
            weighted_average_cost: 1.0,
            last_cost: 1.0,
        };
        [(ingredient.id.clone(), ingredient)].into_iter().collect()
    }

    #[test]
    fn labor_for_fifteen_minutes() {
        assert_relative_eq!(labor_cost(15.0, &GlobalSettings::default()), 3.75);
    }

    #[test]
    fn full_price_breakdown() {
        let ingredients = unit_ingredient();
        let settings = GlobalSettings::default();
        let dish = dish(vec![RecipeComponent::ingredient("i", 10.0)], 15.0);

        let cost = price(&dish, &ingredients, &PreRecipeTable::new(), &settings).unwrap();
        assert_relative_eq!(cost.cni, 10.0);
        assert_relative_eq!(cost.cmo, 3.75);
        assert_relative_eq!(cost.coi, 2.5);
        assert_relative_eq!(cost.base_cost, 16.25);
        assert_relative_eq!(cost.final_price, 25.1488, epsilon = 1e-4);
        assert_relative_eq!(cost.suggested_price, cost.final_price * 0.84, epsilon = 1e-9);
    }

    #[test]
    fn dish_overrides_take_precedence() {
        let settings = GlobalSettings::default();
        let mut d = dish(vec![], 0.0);
        d.target_margin = Some(50.0);
        let policy = PricingPolicy::resolve(&d, &settings);
        assert_eq!(policy.margin, 50.0);
        assert_eq!(policy.tax_rate, 16.0);

        d.tax_rate = Some(0.0);
        assert_eq!(PricingPolicy::resolve(&d, &settings).tax_rate, 0.0);
    }

    #[test]
    fn full_tax_is_unpriceable() {
        let ingredients = unit_ingredient();
        let mut d = dish(vec![RecipeComponent::ingredient("i", 10.0)], 0.0);
        d.tax_rate = Some(100.0);

        let costed =
            price_with_warnings(&d, &ingredients, &PreRecipeTable::new(), &GlobalSettings::default())
                .unwrap();
        assert_eq!(costed.value.final_price, 0.0);
        assert!(costed.value.base_cost > 0.0);
        assert!(matches!(costed.warnings[0], CostWarning::Unpriceable { .. }));
    }

    #[test]
    fn settings_changes_show_up_immediately() {
        let ingredients = unit_ingredient();
        let d = dish(vec![RecipeComponent::ingredient("i", 10.0)], 30.0);
        let mut settings = GlobalSettings::default();
        let before = price(&d, &ingredients, &PreRecipeTable::new(), &settings).unwrap();
        settings.hourly_labor_rate = 30.0;
        let after = price(&d, &ingredients, &PreRecipeTable::new(), &settings).unwrap();
        assert!(after.final_price > before.final_price);
        assert_relative_eq!(after.cmo, 15.0);
    }

    #[test]
    fn menu_isolates_cyclic_dish() {
        let ingredients = unit_ingredient();
        let pre_recipes: PreRecipeTable = [PreRecipe {
            id: "loop".to_string(),
            name: "Loop".to_string(),
            unit: UnitType::L,
            yield_quantity: 1.0,
            components: vec![RecipeComponent::pre_recipe("loop", 1.0)],
        }]
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

        let mut bad = dish(vec![RecipeComponent::pre_recipe("loop", 1.0)], 0.0);
        bad.id = "bad".to_string();
        let mut good = dish(vec![RecipeComponent::ingredient("i", 2.0)], 0.0);
        good.id = "good".to_string();
        let dishes: DishTable = [bad, good].into_iter().map(|d| (d.id.clone(), d)).collect();

        let results = price_menu(&dishes, &ingredients, &pre_recipes, &GlobalSettings::default());
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].1, Err(CostError::CyclicReference { .. })));
        assert_relative_eq!(results[1].1.as_ref().unwrap().value.cni, 2.0);
    }

    proptest! {
        #[test]
        fn pricing_is_pure(qty in 0.0f64..100.0, minutes in 0.0f64..240.0) {
            let ingredients = unit_ingredient();
            let d = dish(vec![RecipeComponent::ingredient("i", qty)], minutes);
            let settings = GlobalSettings::default();
            let first = price(&d, &ingredients, &PreRecipeTable::new(), &settings).unwrap();
            let second = price(&d, &ingredients, &PreRecipeTable::new(), &settings).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
