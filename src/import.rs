//! Catalog import and export
//!
//! A catalog file is JSON holding any of `ingredients`, `preRecipes`,
//! `dishes` and `settings`. Importing a directory walks it for `*.json`
//! files. Component lines can also be written on the command line as
//! `<type>:<id>=<quantity>`, e.g. `ing:2=6` or `pre:p1=0.25`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::error::CostError;
use crate::models::{ComponentKind, Dish, GlobalSettings, Ingredient, PreRecipe, RecipeComponent};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<GlobalSettings>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub pre_recipes: Vec<PreRecipe>,
    #[serde(default)]
    pub dishes: Vec<Dish>,
}

/// Find all catalog files under a path (or the path itself if it is a file)
pub fn find_catalog_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(anyhow!("{} does not exist", path.display()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn parse_catalog_file(filepath: &Path) -> Result<CatalogFile> {
    let content = fs::read_to_string(filepath)
        .with_context(|| format!("Failed to read {}", filepath.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid catalog {}", filepath.display()))
}

/// Store one parsed catalog in a single transaction, so a file that fails
/// partway leaves nothing behind. Ingredients go first so later lines resolve.
fn store_catalog(conn: &mut Connection, catalog: &CatalogFile) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(settings) = &catalog.settings {
        db::save_settings(&tx, settings)?;
        stats.settings = true;
    }
    for ingredient in &catalog.ingredients {
        db::upsert_ingredient(&tx, ingredient)?;
        stats.ingredients += 1;
    }
    for pre_recipe in &catalog.pre_recipes {
        // A cycle is caught before any write, so only that pre-recipe is
        // skipped. Any other failure aborts the whole file.
        match db::write_pre_recipe(&tx, pre_recipe) {
            Ok(()) => stats.pre_recipes += 1,
            Err(e) if e.downcast_ref::<CostError>().is_some() => {
                warn!(pre_recipe = %pre_recipe.id, error = %e, "skipped pre-recipe");
                stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }
    for dish in &catalog.dishes {
        db::write_dish(&tx, dish)?;
        stats.dishes += 1;
    }

    tx.commit()?;
    Ok(stats)
}

/// Import every catalog file found at `path`
pub fn import_to_database(conn: &mut Connection, path: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    let files = find_catalog_files(path)?;
    info!(path = %path.display(), files = files.len(), "importing catalog");

    for filepath in &files {
        let result = parse_catalog_file(filepath).and_then(|catalog| store_catalog(conn, &catalog));
        match result {
            Ok(file_stats) => {
                stats.merge(file_stats);
                stats.files += 1;
            }
            Err(e) => {
                warn!(file = %filepath.display(), error = %e, "failed to import");
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

/// Snapshot the whole database as a catalog
pub fn export_catalog(conn: &Connection) -> Result<CatalogFile> {
    Ok(CatalogFile {
        settings: Some(db::load_settings(conn)?),
        ingredients: db::load_ingredients(conn)?.into_values().collect(),
        pre_recipes: db::load_pre_recipes(conn)?.into_values().collect(),
        dishes: db::load_dishes(conn)?.into_values().collect(),
    })
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub ingredients: usize,
    pub pre_recipes: usize,
    pub dishes: usize,
    pub settings: bool,
    pub errors: usize,
}

impl ImportStats {
    fn merge(&mut self, other: ImportStats) {
        self.files += other.files;
        self.ingredients += other.ingredients;
        self.pre_recipes += other.pre_recipes;
        self.dishes += other.dishes;
        self.settings |= other.settings;
        self.errors += other.errors;
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} files ({} ingredients, {} pre-recipes, {} dishes{}). Errors: {}",
            self.files,
            self.ingredients,
            self.pre_recipes,
            self.dishes,
            if self.settings { ", settings" } else { "" },
            self.errors
        )
    }
}

/// Parse `<type>:<id>=<quantity>` into a component line
pub fn parse_component_spec(spec: &str) -> Result<RecipeComponent> {
    let spec_re = Regex::new(r"^\s*([a-z-]+)\s*:\s*([^=\s]+)\s*=\s*(\d+(?:\.\d+)?|\.\d+)\s*$")?;
    let caps = spec_re
        .captures(spec)
        .ok_or_else(|| anyhow!("expected <type>:<id>=<quantity>, got '{}'", spec))?;

    let kind: ComponentKind = caps[1].parse().map_err(|e: String| anyhow!(e))?;
    let quantity: f64 = caps[3]
        .parse()
        .with_context(|| format!("bad quantity in '{}'", spec))?;

    Ok(RecipeComponent {
        id: caps[2].to_string(),
        kind,
        quantity,
    })
}
