//! # CLI Commands
//!
//! One `cmd_*` function per subcommand. Each loads what it needs from the
//! config path, prints either a human summary or JSON, and returns
//! `Result<(), AppError>` so tests can drive it without a process.

use crate::api::{self, AppState};
use crate::config::LoadedConfig;
use crate::error::AppError;
use crate::runtime::Runtime;
use crate::search::SearchContext;
use crate::session::MemorySessionStore;
use gearstep_core::{
    ApplicabilityMap, ProductId, ProductRef, StageId, StateSequencer, StrategyKind, UnitNormalizer,
};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// SERVE
// =============================================================================

/// Start the HTTP server. `bind` overrides the configured address.
pub async fn cmd_serve(config: &Path, bind: Option<&str>) -> Result<(), AppError> {
    let runtime = Runtime::load(config)?;
    let addr = bind.map_or_else(|| runtime.config.server.bind.clone(), str::to_string);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let sessions = MemorySessionStore::new()
        .with_idle_timeout(Duration::from_secs(runtime.config.server.session_idle_secs));
    let state = AppState::new(runtime, Arc::new(sessions), Some(config.to_path_buf()));
    api::serve(state, listener).await?;
    Ok(())
}

// =============================================================================
// VALIDATE
// =============================================================================

/// Load and cross-check every config file.
pub fn cmd_validate(config: &Path, as_json: bool) -> Result<(), AppError> {
    let loaded = LoadedConfig::load(config)?;
    let enabled: Vec<StrategyKind> = StrategyKind::ALL
        .into_iter()
        .filter(|kind| loaded.app.search.strategy(*kind).enabled)
        .collect();

    if as_json {
        return print_json(&json!({
            "valid": true,
            "stages": loaded.registry.len(),
            "products": loaded.catalog.products.len(),
            "edges": loaded.catalog.compatibility.len(),
            "strategies": enabled,
            "fingerprint": loaded.fingerprint.to_string(),
        }));
    }

    println!("Config OK");
    println!("  Stages:      {}", loaded.registry.len());
    println!("  Products:    {}", loaded.catalog.products.len());
    println!("  Edges:       {}", loaded.catalog.compatibility.len());
    println!(
        "  Strategies:  {}",
        enabled.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!("  Fingerprint: {}", loaded.fingerprint);
    Ok(())
}

// =============================================================================
// PLAN
// =============================================================================

/// Preview the stages a session would walk for a given root product.
pub fn cmd_plan(config: &Path, root: Option<&str>, as_json: bool) -> Result<(), AppError> {
    let loaded = LoadedConfig::load(config)?;
    let applicability = match root {
        Some(id) => {
            let product = loaded
                .catalog
                .get(&ProductId::new(id))
                .ok_or_else(|| AppError::NotFound(format!("product '{id}'")))?;
            loaded
                .applicability
                .resolve_for(&loaded.registry, &product.id)
        }
        None => ApplicabilityMap::permissive(),
    };

    let plan = StateSequencer::new(&loaded.registry).plan(&applicability);
    let excluded: Vec<(&StageId, gearstep_core::Applicability)> = loaded
        .registry
        .stages()
        .iter()
        .map(|s| (&s.id, applicability.get(&s.id)))
        .filter(|(_, a)| !a.is_applicable())
        .collect();

    if as_json {
        return print_json(&json!({
            "root": root,
            "plan": plan,
            "not_applicable": excluded.iter().map(|(id, a)| json!({"stage": id, "applicability": a})).collect::<Vec<_>>(),
        }));
    }

    for (i, id) in plan.iter().enumerate() {
        let name = loaded.registry.get(id).map_or("", |s| s.name.as_str());
        println!("{:>2}. {} ({})", i.saturating_add(1), id, name);
    }
    for (id, applicability) in &excluded {
        println!("    - {} not applicable ({:?})", id, applicability);
    }
    Ok(())
}

// =============================================================================
// SEARCH
// =============================================================================

/// Run one consolidated search for a stage, as the flow would.
///
/// `selects` are product ids treated as prior selections; each is assigned
/// to the stage searching its category.
pub async fn cmd_search(
    config: &Path,
    stage: &str,
    text: &str,
    selects: &[String],
    as_json: bool,
) -> Result<(), AppError> {
    let runtime = Runtime::load(config)?;
    let stage_id = StageId::new(stage);
    let target = runtime
        .registry
        .get(&stage_id)
        .ok_or_else(|| AppError::NotFound(format!("stage '{stage}'")))?;

    let mut selected: Vec<(StageId, ProductRef)> = Vec::with_capacity(selects.len());
    for id in selects {
        let product = runtime
            .catalog
            .get(&ProductId::new(id.as_str()))
            .ok_or_else(|| AppError::NotFound(format!("product '{id}'")))?;
        let owner = runtime
            .registry
            .stages()
            .iter()
            .find(|s| s.search.category == product.category)
            .ok_or_else(|| {
                AppError::Invalid(format!("no stage offers category '{}'", product.category))
            })?;
        selected.push((
            owner.id.clone(),
            ProductRef::new(product.id.as_str(), product.name.clone(), product.category.clone()),
        ));
    }

    let context = SearchContext::new(target.clone())
        .with_text(text)
        .with_selected(selected);
    let consolidation = runtime.consolidator.execute(&context).await;

    if as_json {
        return print_json(&consolidation);
    }

    println!(
        "Stage {} ({} candidates{})",
        target.id,
        consolidation.products.len(),
        if consolidation.compatibility_applied {
            ", compatibility filter applied"
        } else {
            ""
        }
    );
    for (i, product) in consolidation.products.iter().enumerate() {
        println!(
            "{:>3}. {:<16} {:<32} {}",
            i.saturating_add(1),
            product.id.as_str(),
            product.name,
            product.combined
        );
    }
    println!();
    for report in &consolidation.reports {
        match &report.error {
            Some(error) => println!(
                "  {:<12} failed after {} ms: {}",
                report.strategy.as_str(),
                report.latency_ms,
                error
            ),
            None => println!(
                "  {:<12} {} hits in {} ms",
                report.strategy.as_str(),
                report.hits,
                report.latency_ms
            ),
        }
    }
    Ok(())
}

// =============================================================================
// NORMALIZE
// =============================================================================

/// Show what the unit normalizer makes of some text.
pub fn cmd_normalize(text: &str, as_json: bool) -> Result<(), AppError> {
    let normalizer = UnitNormalizer::new()?;
    let normalized = normalizer.normalize(text);
    if as_json {
        return print_json(&json!({ "input": text, "normalized": normalized }));
    }
    println!("{normalized}");
    Ok(())
}
