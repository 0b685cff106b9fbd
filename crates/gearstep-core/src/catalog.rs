//! # Catalog
//!
//! Product catalog loaded from JSON: products, their declared capabilities,
//! and compatibility edges. The in-process graph and text index are both
//! built from it.

use crate::applicability::{ApplicabilityTable, CapabilityMap};
use crate::graph::{CompatibilityGraph, GraphNode};
use crate::index::TextIndex;
use crate::normalize::UnitNormalizer;
use crate::stage::StageRegistry;
use crate::{ConfigError, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn default_relationship() -> String {
    "compatible".to_string()
}

/// One catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Listing priority when nothing else orders the category (lower first).
    #[serde(default)]
    pub priority: u32,
    /// Stage applicability this product implies when chosen as root.
    #[serde(default)]
    pub capabilities: CapabilityMap,
}

/// Undirected compatibility between two products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEdge {
    pub from: ProductId,
    pub to: ProductId,
    #[serde(default = "default_relationship")]
    pub relationship: String,
    #[serde(default)]
    pub priority: u32,
}

/// The catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub products: Vec<CatalogProduct>,
    #[serde(default)]
    pub compatibility: Vec<CatalogEdge>,
}

impl Catalog {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Unique canonical ids; every edge endpoint exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = BTreeSet::new();
        for product in &self.products {
            if !ids.insert(product.id.canonical()) {
                return Err(ConfigError::DuplicateProduct(product.id.clone()));
            }
        }
        for edge in &self.compatibility {
            for end in [&edge.from, &edge.to] {
                if !ids.contains(&end.canonical()) {
                    return Err(ConfigError::UnknownProduct(end.clone()));
                }
            }
        }
        Ok(())
    }

    /// Every stage searches a category that has at least one product.
    pub fn check_stages(&self, registry: &StageRegistry) -> Result<(), ConfigError> {
        let categories = self.categories();
        for stage in registry.stages() {
            if !categories.contains(stage.search.category.as_str()) {
                return Err(ConfigError::UnknownCategory {
                    stage: stage.id.clone(),
                    category: stage.search.category.clone(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn categories(&self) -> BTreeSet<&str> {
        self.products.iter().map(|p| p.category.as_str()).collect()
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CatalogProduct> {
        let key = id.canonical();
        self.products.iter().find(|p| p.id.canonical() == key)
    }

    /// Register declared capabilities into `table`, rejecting unknown stages.
    pub fn declare_capabilities(
        &self,
        registry: &StageRegistry,
        table: &mut ApplicabilityTable,
    ) -> Result<(), ConfigError> {
        for product in &self.products {
            if let Some(stage) = product
                .capabilities
                .keys()
                .find(|stage| registry.get(stage).is_none())
            {
                return Err(ConfigError::UnknownApplicabilityStage {
                    root: product.id.clone(),
                    stage: stage.clone(),
                });
            }
            table.declare(&product.id, product.capabilities.clone());
        }
        Ok(())
    }

    #[must_use]
    pub fn build_graph(&self) -> CompatibilityGraph {
        let mut graph = CompatibilityGraph::new();
        for product in &self.products {
            graph.insert_node(GraphNode {
                id: product.id.clone(),
                name: product.name.clone(),
                category: product.category.clone(),
                priority: product.priority,
            });
        }
        for edge in &self.compatibility {
            graph.insert_edge(&edge.from, &edge.to, &edge.relationship, edge.priority);
        }
        graph
    }

    #[must_use]
    pub fn build_index(&self, normalizer: &UnitNormalizer) -> TextIndex {
        let mut index = TextIndex::new();
        for product in &self.products {
            let mut fields: Vec<&str> = vec![product.description.as_str()];
            fields.extend(product.attributes.values().map(String::as_str));
            index.add(normalizer, &product.id, &product.name, &product.category, &fields);
        }
        index
    }
}

// =============================================================================
// TESTS
// =============================================================================
