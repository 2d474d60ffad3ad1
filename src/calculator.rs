//! Recipe cost resolution
//!
//! Costs flow bottom-up: ingredient unit cost (CUE) feeds component costs,
//! which sum into pre-recipe unit costs (CUPR), which feed further
//! components. Pre-recipes may nest to any depth, so resolution carries the
//! stack of pre-recipes currently being costed and fails on a cycle instead
//! of recursing forever.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{CostError, CostWarning, Costed};
use crate::models::{
    ComponentKind, CostNode, DishTable, Ingredient, IngredientTable, NodeStatus, PreRecipe,
    PreRecipeTable, RecipeComponent, UnitType,
};

/// Returned by [`cue`] when waste leaves nothing usable. Large enough to stand
/// out in any price, but still finite.
pub const INCOMPUTABLE_COST: f64 = 999_999.0;

/// Cost per standard unit of an ingredient, waste-adjusted
pub fn cue(ingredient: &Ingredient) -> f64 {
    unit_cost(ingredient, &mut Vec::new())
}

fn unit_cost(ingredient: &Ingredient, warnings: &mut Vec<CostWarning>) -> f64 {
    if ingredient.conversion_factor == 0.0 {
        let first = push_unique(
            warnings,
            CostWarning::ZeroConversionFactor {
                ingredient: ingredient.id.clone(),
            },
        );
        if first {
            warn!(ingredient = %ingredient.id, "zero conversion factor, costing at 0");
        }
        return 0.0;
    }

    let usable = 1.0 - ingredient.waste_factor;
    if usable <= 0.0 {
        let first = push_unique(
            warnings,
            CostWarning::NoUsableYield {
                ingredient: ingredient.id.clone(),
                waste_factor: ingredient.waste_factor,
            },
        );
        if first {
            warn!(
                ingredient = %ingredient.id,
                waste_factor = ingredient.waste_factor,
                "no usable yield after waste, costing at sentinel"
            );
        }
        return INCOMPUTABLE_COST;
    }

    ingredient.weighted_average_cost / (ingredient.conversion_factor * usable)
}

/// Cost of one bill-of-materials line
pub fn component_cost(
    component: &RecipeComponent,
    ingredients: &IngredientTable,
    pre_recipes: &PreRecipeTable,
) -> Result<f64, CostError> {
    Resolver::new(ingredients, pre_recipes).component_cost(component)
}

/// Cost per output unit of a pre-recipe
pub fn cupr(
    pre_recipe: &PreRecipe,
    ingredients: &IngredientTable,
    pre_recipes: &PreRecipeTable,
) -> Result<f64, CostError> {
    Resolver::new(ingredients, pre_recipes).pre_recipe_unit_cost(pre_recipe)
}

/// Like [`cupr`], also returning the degenerate inputs met along the way
pub fn cupr_with_warnings(
    pre_recipe: &PreRecipe,
    ingredients: &IngredientTable,
    pre_recipes: &PreRecipeTable,
) -> Result<Costed<f64>, CostError> {
    let mut resolver = Resolver::new(ingredients, pre_recipes);
    let value = resolver.pre_recipe_unit_cost(pre_recipe)?;
    Ok(Costed {
        value,
        warnings: resolver.into_warnings(),
    })
}

/// One top-level cost computation over an immutable snapshot of the tables.
///
/// Pre-recipe unit costs looked up from the table are memoized by id for the
/// lifetime of the resolver.
pub struct Resolver<'a> {
    ingredients: &'a IngredientTable,
    pre_recipes: &'a PreRecipeTable,
    memo: HashMap<String, f64>,
    stack: Vec<String>,
    warnings: Vec<CostWarning>,
}

impl<'a> Resolver<'a> {
    pub fn new(ingredients: &'a IngredientTable, pre_recipes: &'a PreRecipeTable) -> Self {
        Self {
            ingredients,
            pre_recipes,
            memo: HashMap::new(),
            stack: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[CostWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<CostWarning> {
        self.warnings
    }

    pub fn component_cost(&mut self, component: &RecipeComponent) -> Result<f64, CostError> {
        let (ingredients, pre_recipes) = (self.ingredients, self.pre_recipes);
        let unit = match component.kind {
            ComponentKind::Ingredient => match ingredients.get(&component.id) {
                Some(ingredient) => unit_cost(ingredient, &mut self.warnings),
                None => {
                    self.dangling(component);
                    return Ok(0.0);
                }
            },
            ComponentKind::PreRecipe => match pre_recipes.get(&component.id) {
                Some(pre_recipe) => self.cached_unit_cost(pre_recipe)?,
                None => {
                    self.dangling(component);
                    return Ok(0.0);
                }
            },
        };
        Ok(unit * component.quantity)
    }

    /// Sum of component costs
    pub fn components_cost(&mut self, components: &[RecipeComponent]) -> Result<f64, CostError> {
        let mut total = 0.0;
        for component in components {
            total += self.component_cost(component)?;
        }
        Ok(total)
    }

    pub fn pre_recipe_unit_cost(&mut self, pre_recipe: &PreRecipe) -> Result<f64, CostError> {
        if let Some(pos) = self.stack.iter().position(|id| id == &pre_recipe.id) {
            let mut path = self.stack[pos..].to_vec();
            path.push(pre_recipe.id.clone());
            return Err(CostError::CyclicReference { path });
        }

        if pre_recipe.yield_quantity == 0.0 {
            let first = push_unique(
                &mut self.warnings,
                CostWarning::ZeroYield {
                    pre_recipe: pre_recipe.id.clone(),
                },
            );
            if first {
                warn!(pre_recipe = %pre_recipe.id, "zero yield, costing at 0");
            }
            return Ok(0.0);
        }

        self.stack.push(pre_recipe.id.clone());
        let total = self.components_cost(&pre_recipe.components);
        self.stack.pop();

        let unit = total? / pre_recipe.yield_quantity;
        debug!(pre_recipe = %pre_recipe.id, unit_cost = unit, "resolved pre-recipe");
        Ok(unit)
    }

    fn cached_unit_cost(&mut self, pre_recipe: &PreRecipe) -> Result<f64, CostError> {
        if let Some(cost) = self.memo.get(&pre_recipe.id) {
            return Ok(*cost);
        }
        let cost = self.pre_recipe_unit_cost(pre_recipe)?;
        self.memo.insert(pre_recipe.id.clone(), cost);
        Ok(cost)
    }

    fn dangling(&mut self, component: &RecipeComponent) {
        let first = push_unique(
            &mut self.warnings,
            CostWarning::DanglingReference {
                kind: component.kind,
                id: component.id.clone(),
            },
        );
        if first {
            warn!(kind = %component.kind, id = %component.id, "component reference does not resolve");
        }
    }

    /// Cost breakdown tree for a component list.
    ///
    /// Children of a pre-recipe line are scaled to the quantity of that line,
    /// so their line costs add up to the parent's. Cycles and missing
    /// references become marked leaves rather than errors.
    pub fn explain(&mut self, components: &[RecipeComponent], scale: f64) -> Vec<CostNode> {
        components
            .iter()
            .map(|component| self.explain_component(component, component.quantity * scale))
            .collect()
    }

    fn explain_component(&mut self, component: &RecipeComponent, quantity: f64) -> CostNode {
        let mut node = CostNode {
            id: component.id.clone(),
            name: component.id.clone(),
            kind: component.kind,
            quantity,
            unit: None,
            unit_cost: 0.0,
            line_cost: 0.0,
            status: NodeStatus::Resolved,
            children: Vec::new(),
        };

        let (ingredients, pre_recipes) = (self.ingredients, self.pre_recipes);
        match component.kind {
            ComponentKind::Ingredient => match ingredients.get(&component.id) {
                Some(ingredient) => {
                    node.name = ingredient.name.clone();
                    node.unit = Some(ingredient.standard_unit);
                    node.unit_cost = unit_cost(ingredient, &mut self.warnings);
                }
                None => {
                    self.dangling(component);
                    node.status = NodeStatus::Missing;
                }
            },
            ComponentKind::PreRecipe => {
                let Some(pre_recipe) = pre_recipes.get(&component.id) else {
                    self.dangling(component);
                    node.status = NodeStatus::Missing;
                    return node;
                };
                node.name = pre_recipe.name.clone();
                node.unit = Some(pre_recipe.unit);

                if self.stack.contains(&pre_recipe.id) {
                    node.status = NodeStatus::Cycle;
                    return node;
                }

                match self.cached_unit_cost(pre_recipe) {
                    Ok(cost) => node.unit_cost = cost,
                    Err(_) => {
                        node.status = NodeStatus::Cycle;
                        return node;
                    }
                }

                let scale = if pre_recipe.yield_quantity > 0.0 {
                    quantity / pre_recipe.yield_quantity
                } else {
                    0.0
                };
                self.stack.push(pre_recipe.id.clone());
                node.children = self.explain(&pre_recipe.components, scale);
                self.stack.pop();
            }
        }

        node.line_cost = node.unit_cost * quantity;
        node
    }
}

/// Returns true if the warning was new
fn push_unique(warnings: &mut Vec<CostWarning>, warning: CostWarning) -> bool {
    if warnings.contains(&warning) {
        return false;
    }
    warnings.push(warning);
    true
}

/// Find a pre-recipe cycle anywhere in the table, if one exists.
///
/// The returned path starts and ends with the same id.
pub fn find_cycle(pre_recipes: &PreRecipeTable) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        id: &str,
        pre_recipes: &PreRecipeTable,
        marks: &mut HashMap<String, Mark>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let pos = path.iter().position(|p| p == id).unwrap_or(0);
                let mut cycle = path[pos..].to_vec();
                cycle.push(id.to_string());
                return Some(cycle);
            }
            None => {}
        }

        let pre_recipe = pre_recipes.get(id)?;
        marks.insert(id.to_string(), Mark::Visiting);
        path.push(id.to_string());

        for component in &pre_recipe.components {
            if component.kind == ComponentKind::PreRecipe {
                if let Some(cycle) = visit(&component.id, pre_recipes, marks, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        marks.insert(id.to_string(), Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    for id in pre_recipes.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = visit(id, pre_recipes, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

/// An item whose bill of materials references a given id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum UsedBy {
    PreRecipe(String),
    Dish(String),
}

/// Pre-recipes and dishes that directly reference `id`
pub fn where_used(
    kind: ComponentKind,
    id: &str,
    pre_recipes: &PreRecipeTable,
    dishes: &DishTable,
) -> Vec<UsedBy> {
    let references =
        |components: &[RecipeComponent]| components.iter().any(|c| c.kind == kind && c.id == id);

    let mut used: Vec<UsedBy> = pre_recipes
        .values()
        .filter(|p| references(&p.components))
        .map(|p| UsedBy::PreRecipe(p.id.clone()))
        .collect();
    used.extend(
        dishes
            .values()
            .filter(|d| references(&d.components))
            .map(|d| UsedBy::Dish(d.id.clone())),
    );
    used
}

/// Format a cost breakdown as a readable tree
pub fn format_cost_tree(nodes: &[CostNode], indent: usize, currency: &str) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);

    for node in nodes {
        let unit = node.unit.map(|u| u.as_str()).unwrap_or("");
        match node.status {
            NodeStatus::Missing => output.push_str(&format!(
                "{}{} {} {:.3} (not found, costed as 0)\n",
                prefix, node.kind, node.id, node.quantity
            )),
            NodeStatus::Cycle => output.push_str(&format!(
                "{}{} ({}) {:.3} {} [CYCLE DETECTED]\n",
                prefix, node.name, node.id, node.quantity, unit
            )),
            NodeStatus::Resolved => {
                output.push_str(&format!(
                    "{}{:.3} {} {} @ {:.4}/{} = {:.2} {}\n",
                    prefix,
                    node.quantity,
                    unit,
                    node.name,
                    node.unit_cost,
                    unit,
                    node.line_cost,
                    currency
                ));
                output.push_str(&format_cost_tree(&node.children, indent + 1, currency));
            }
        }
    }

    output
}

/// Raw ingredient requirements rolled up from a breakdown tree
#[derive(Debug)]
pub struct BreakdownSummary {
    pub total_cost: f64,
    pub currency: String,
    /// (name, quantity, unit, cost) sorted by name
    pub raw_ingredients: Vec<(String, f64, Option<UnitType>, f64)>,
    pub unresolved: Vec<String>,
}

/// Generate a summary of the breakdown
pub fn summarize_breakdown(nodes: &[CostNode], currency: &str) -> BreakdownSummary {
    let mut raw: BTreeMap<String, (f64, Option<UnitType>, f64)> = BTreeMap::new();
    let mut unresolved = HashSet::new();

    collect_summary(nodes, &mut raw, &mut unresolved);

    let mut unresolved: Vec<String> = unresolved.into_iter().collect();
    unresolved.sort();

    BreakdownSummary {
        total_cost: nodes.iter().map(|n| n.line_cost).sum(),
        currency: currency.to_string(),
        raw_ingredients: raw
            .into_iter()
            .map(|(name, (qty, unit, cost))| (name, qty, unit, cost))
            .collect(),
        unresolved,
    }
}

fn collect_summary(
    nodes: &[CostNode],
    raw: &mut BTreeMap<String, (f64, Option<UnitType>, f64)>,
    unresolved: &mut HashSet<String>,
) {
    for node in nodes {
        match (node.status, node.kind) {
            (NodeStatus::Resolved, ComponentKind::Ingredient) => {
                let entry = raw.entry(node.name.clone()).or_insert((0.0, node.unit, 0.0));
                entry.0 += node.quantity;
                entry.2 += node.line_cost;
            }
            (NodeStatus::Resolved, ComponentKind::PreRecipe) => {
                collect_summary(&node.children, raw, unresolved);
            }
            _ => {
                unresolved.insert(node.id.clone());
            }
        }
    }
}

impl std::fmt::Display for BreakdownSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingredient Summary ===")?;
        for (name, qty, unit, cost) in &self.raw_ingredients {
            let unit = unit.map(|u| u.as_str()).unwrap_or("");
            writeln!(f, "  {:<28} {:>10.3} {:<3} {:>10.2}", name, qty, unit, cost)?;
        }
        writeln!(f, "  {:<42} {:>10.2} {}", "Total", self.total_cost, self.currency)?;

        if !self.unresolved.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unresolved references: {}", self.unresolved.join(", "))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn ingredient(id: &str, conversion: f64, waste: f64, wac: f64) -> Ingredient {
        Ingredient {
            id: id.to_string(),
            name: format!("Ingredient {}", id),
            category: "Test".to_string(),
            purchase_unit: "box".to_string(),
            standard_unit: UnitType::Kg,
            conversion_factor: conversion,
            waste_factor: waste,
            current_stock: 0.0,
            min_stock: 0.0,
            weighted_average_cost: wac,
            last_cost: wac,
        }
    }

    fn pre_recipe(id: &str, yield_quantity: f64, components: Vec<RecipeComponent>) -> PreRecipe {
        PreRecipe {
            id: id.to_string(),
            name: format!("Pre-recipe {}", id),
            unit: UnitType::L,
            yield_quantity,
            components,
        }
    }

    fn tables(
        ingredients: Vec<Ingredient>,
        pre_recipes: Vec<PreRecipe>,
    ) -> (IngredientTable, PreRecipeTable) {
        (
            ingredients.into_iter().map(|i| (i.id.clone(), i)).collect(),
            pre_recipes.into_iter().map(|p| (p.id.clone(), p)).collect(),
        )
    }

    #[test]
    fn cue_without_waste_or_conversion_is_wac() {
        assert_relative_eq!(cue(&ingredient("1", 1.0, 0.0, 8.5)), 8.5);
    }

    #[test]
    fn cue_for_flour_sack() {
        let flour = ingredient("1", 25.0, 0.02, 25.0);
        assert_relative_eq!(cue(&flour), 1.0204, epsilon = 1e-4);
    }

    #[test]
    fn cue_zero_conversion_is_zero() {
        let mut warnings = Vec::new();
        assert_eq!(unit_cost(&ingredient("x", 0.0, 0.1, 10.0), &mut warnings), 0.0);
        assert!(matches!(warnings[0], CostWarning::ZeroConversionFactor { .. }));
    }

    #[test]
    fn cue_total_waste_returns_sentinel() {
        let mut warnings = Vec::new();
        let cost = unit_cost(&ingredient("x", 1.0, 1.0, 10.0), &mut warnings);
        assert_eq!(cost, INCOMPUTABLE_COST);
        assert!(cost.is_finite());
        assert!(matches!(warnings[0], CostWarning::NoUsableYield { .. }));
    }

    #[test]
    fn tomato_sauce_costs() {
        let (ingredients, pre_recipes) = tables(
            vec![ingredient("2", 10.0, 0.15, 18.0)],
            vec![pre_recipe("p1", 5.0, vec![RecipeComponent::ingredient("2", 6.0)])],
        );
        let sauce = &pre_recipes["p1"];

        assert_relative_eq!(cue(&ingredients["2"]), 2.1176, epsilon = 1e-4);
        let line = component_cost(&sauce.components[0], &ingredients, &pre_recipes).unwrap();
        assert_relative_eq!(line, 12.7059, epsilon = 1e-4);
        assert_relative_eq!(
            cupr(sauce, &ingredients, &pre_recipes).unwrap(),
            2.5412,
            epsilon = 1e-4
        );
    }

    #[test]
    fn nested_pre_recipes_resolve() {
        let (ingredients, pre_recipes) = tables(
            vec![ingredient("a", 1.0, 0.0, 2.0)],
            vec![
                pre_recipe("inner", 2.0, vec![RecipeComponent::ingredient("a", 4.0)]),
                pre_recipe("outer", 1.0, vec![RecipeComponent::pre_recipe("inner", 3.0)]),
            ],
        );
        // inner: 8 / 2 = 4 per unit; outer: 3 * 4 = 12
        assert_relative_eq!(
            cupr(&pre_recipes["outer"], &ingredients, &pre_recipes).unwrap(),
            12.0
        );
    }

    #[test]
    fn zero_yield_is_zero_with_warning() {
        let (ingredients, pre_recipes) = tables(
            vec![ingredient("a", 1.0, 0.0, 2.0)],
            vec![pre_recipe("p", 0.0, vec![RecipeComponent::ingredient("a", 4.0)])],
        );
        let costed = cupr_with_warnings(&pre_recipes["p"], &ingredients, &pre_recipes).unwrap();
        assert_eq!(costed.value, 0.0);
        assert_eq!(
            costed.warnings,
            vec![CostWarning::ZeroYield {
                pre_recipe: "p".to_string()
            }]
        );
    }

    #[test]
    fn dangling_references_cost_zero_and_warn() {
        let (ingredients, pre_recipes) = tables(
            vec![ingredient("a", 1.0, 0.0, 2.0)],
            vec![pre_recipe(
                "p",
                1.0,
                vec![
                    RecipeComponent::ingredient("a", 1.0),
                    RecipeComponent::ingredient("gone", 5.0),
                    RecipeComponent::pre_recipe("also-gone", 5.0),
                ],
            )],
        );
        let costed = cupr_with_warnings(&pre_recipes["p"], &ingredients, &pre_recipes).unwrap();
        assert_relative_eq!(costed.value, 2.0);
        assert_eq!(costed.warnings.len(), 2);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let (ingredients, pre_recipes) = tables(
            vec![],
            vec![pre_recipe("a", 1.0, vec![RecipeComponent::pre_recipe("a", 1.0)])],
        );
        let err = cupr(&pre_recipes["a"], &ingredients, &pre_recipes).unwrap_err();
        assert_eq!(
            err,
            CostError::CyclicReference {
                path: vec!["a".to_string(), "a".to_string()]
            }
        );
    }

    #[test]
    fn two_step_cycle_is_detected() {
        let (ingredients, pre_recipes) = tables(
            vec![],
            vec![
                pre_recipe("a", 1.0, vec![RecipeComponent::pre_recipe("b", 1.0)]),
                pre_recipe("b", 1.0, vec![RecipeComponent::pre_recipe("a", 1.0)]),
            ],
        );
        let err = cupr(&pre_recipes["a"], &ingredients, &pre_recipes).unwrap_err();
        assert_eq!(
            err,
            CostError::CyclicReference {
                path: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }
        );
        assert!(find_cycle(&pre_recipes).is_some());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let (ingredients, pre_recipes) = tables(
            vec![ingredient("i", 1.0, 0.0, 1.0)],
            vec![
                pre_recipe("base", 1.0, vec![RecipeComponent::ingredient("i", 1.0)]),
                pre_recipe("left", 1.0, vec![RecipeComponent::pre_recipe("base", 1.0)]),
                pre_recipe("right", 1.0, vec![RecipeComponent::pre_recipe("base", 2.0)]),
                pre_recipe(
                    "top",
                    1.0,
                    vec![
                        RecipeComponent::pre_recipe("left", 1.0),
                        RecipeComponent::pre_recipe("right", 1.0),
                    ],
                ),
            ],
        );
        assert!(find_cycle(&pre_recipes).is_none());
        assert_relative_eq!(cupr(&pre_recipes["top"], &ingredients, &pre_recipes).unwrap(), 3.0);
    }

    #[test]
    fn explain_scales_children_to_line_quantity() {
        let (ingredients, pre_recipes) = tables(
            vec![ingredient("2", 10.0, 0.15, 18.0)],
            vec![pre_recipe("p1", 5.0, vec![RecipeComponent::ingredient("2", 6.0)])],
        );
        let mut resolver = Resolver::new(&ingredients, &pre_recipes);
        let nodes = resolver.explain(&[RecipeComponent::pre_recipe("p1", 0.25)], 1.0);

        assert_eq!(nodes.len(), 1);
        let sauce = &nodes[0];
        assert_relative_eq!(sauce.line_cost, 0.25 * 2.5412, epsilon = 1e-4);
        assert_relative_eq!(sauce.children[0].quantity, 0.3, epsilon = 1e-12);
        assert_relative_eq!(sauce.children[0].line_cost, sauce.line_cost, epsilon = 1e-9);

        let summary = summarize_breakdown(&nodes, "USD");
        assert_eq!(summary.raw_ingredients.len(), 1);
        assert_relative_eq!(summary.raw_ingredients[0].1, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn explain_marks_cycles_and_missing() {
        let (ingredients, pre_recipes) = tables(
            vec![],
            vec![pre_recipe("a", 1.0, vec![RecipeComponent::pre_recipe("a", 1.0)])],
        );
        let mut resolver = Resolver::new(&ingredients, &pre_recipes);
        let nodes = resolver.explain(
            &[
                RecipeComponent::pre_recipe("a", 1.0),
                RecipeComponent::ingredient("nope", 1.0),
            ],
            1.0,
        );
        assert_eq!(nodes[0].status, NodeStatus::Cycle);
        assert_eq!(nodes[1].status, NodeStatus::Missing);

        let text = format_cost_tree(&nodes, 0, "USD");
        assert!(text.contains("CYCLE DETECTED"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn where_used_finds_direct_references() {
        let pre_recipes: PreRecipeTable = [pre_recipe(
            "p1",
            5.0,
            vec![RecipeComponent::ingredient("2", 6.0)],
        )]
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
        let used = where_used(ComponentKind::Ingredient, "2", &pre_recipes, &DishTable::new());
        assert_eq!(used, vec![UsedBy::PreRecipe("p1".to_string())]);
        assert!(where_used(ComponentKind::PreRecipe, "2", &pre_recipes, &DishTable::new()).is_empty());
    }

    /// Collects formatted log output for the duration of `f`
    fn logged(f: impl FnOnce()) -> String {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Buffer(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Buffer {
            fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(bytes);
                Ok(bytes.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Buffer {
            type Writer = Buffer;

            fn make_writer(&'a self) -> Self::Writer {
                self.clone()
            }
        }

        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn degenerate_inputs_logged_once_per_computation() {
        let (ingredients, pre_recipes) = tables(
            vec![
                ingredient("z", 0.0, 0.0, 10.0),
                ingredient("w", 1.0, 1.0, 10.0),
            ],
            vec![pre_recipe("p0", 0.0, vec![RecipeComponent::ingredient("z", 1.0)])],
        );
        let components = vec![
            RecipeComponent::ingredient("z", 1.0),
            RecipeComponent::ingredient("z", 2.0),
            RecipeComponent::ingredient("w", 1.0),
            RecipeComponent::ingredient("w", 1.0),
            RecipeComponent::pre_recipe("p0", 1.0),
            RecipeComponent::pre_recipe("p0", 1.0),
        ];

        let mut warnings = Vec::new();
        let output = logged(|| {
            let mut resolver = Resolver::new(&ingredients, &pre_recipes);
            resolver.components_cost(&components).unwrap();
            warnings = resolver.into_warnings();
        });

        assert_eq!(warnings.len(), 3);
        assert_eq!(output.matches("zero conversion factor").count(), 1);
        assert_eq!(output.matches("no usable yield").count(), 1);
        assert_eq!(output.matches("zero yield, costing at 0").count(), 1);
    }

    proptest! {
        #[test]
        fn cue_rises_with_waste(
            wac in 0.01f64..1000.0,
            conversion in 0.1f64..100.0,
            low in 0.0f64..0.98,
            bump in 0.001f64..0.01,
        ) {
            let high = low + bump;
            let a = cue(&ingredient("x", conversion, low, wac));
            let b = cue(&ingredient("x", conversion, high, wac));
            prop_assert!(b > a);
        }

        #[test]
        fn cue_falls_with_conversion(
            wac in 0.01f64..1000.0,
            waste in 0.0f64..0.9,
            conversion in 0.1f64..100.0,
            bump in 0.1f64..10.0,
        ) {
            let a = cue(&ingredient("x", conversion, waste, wac));
            let b = cue(&ingredient("x", conversion + bump, waste, wac));
            prop_assert!(b < a);
        }
    }
}
