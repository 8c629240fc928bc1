//! Offline repair of existing catalogs.
//!
//! Older catalogs may carry detector-era ids (`det_5`, `mrg_2`) or reading
//! orders that point at blocks which no longer exist. [`CatalogRepairer`]
//! renames every block to `block_{page}_{NNN}` in reading-order policy order
//! and rebuilds any page order it cannot map. Text is never recomputed.
//!
//! A catalog whose ids are already well-formed keeps them; only broken
//! reading orders are rebuilt. Repairing a repaired catalog changes nothing.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::ReadingOrderKind;
use crate::error::Result;
use crate::ids::{final_id, parse_final_id};
use crate::pipeline::reading_order::{create_strategy, OrderItem, ReadingOrderContext, ReadingOrderStrategy};

use super::model::Catalog;
use super::validate::validate_all;
use super::writer::write_json;

/// Result of repairing one catalog.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// The repaired catalog
    pub catalog: Catalog,
    /// Did anything change?
    pub changed: bool,
    /// Old id → new id for every renamed block
    pub id_mapping: IndexMap<String, String>,
    /// Pages whose reading order was rebuilt from geometry
    pub rebuilt_pages: Vec<usize>,
}

/// Id census of a catalog, without modifying it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    /// Blocks in the catalog
    pub total_blocks: usize,
    /// Ids starting with `block_`
    pub block_ids: usize,
    /// Ids starting with `det_`
    pub det_ids: usize,
    /// Ids starting with `mrg_`
    pub mrg_ids: usize,
    /// Anything else
    pub other_ids: usize,
    /// Every id is a distinct `block_{page}_{NNN}` for its own page
    pub normalized: bool,
    /// `metadata.ids_normalized` is set
    pub has_metadata: bool,
}

/// Totals of a cache-directory repair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryReport {
    /// Catalogs found
    pub total: usize,
    /// Catalogs rewritten
    pub repaired: usize,
    /// Catalogs already in shape
    pub unchanged: usize,
    /// Catalogs that could not be read or written
    pub errors: usize,
}

/// Normalizes ids and reading order of existing catalogs.
pub struct CatalogRepairer {
    backup: bool,
    strategy: Box<dyn ReadingOrderStrategy>,
}

impl std::fmt::Debug for CatalogRepairer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogRepairer")
            .field("backup", &self.backup)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl Default for CatalogRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogRepairer {
    /// Repairer using the two-column policy, with backups.
    pub fn new() -> Self {
        Self {
            backup: true,
            strategy: create_strategy(ReadingOrderKind::TwoColumn),
        }
    }

    /// Keep a timestamped copy of each file before rewriting it.
    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup = enabled;
        self
    }

    /// Reading-order policy used for numbering and rebuilding.
    pub fn with_reading_order(mut self, kind: ReadingOrderKind) -> Self {
        self.strategy = create_strategy(kind);
        self
    }

    /// Count id kinds.
    pub fn check(&self, catalog: &Catalog) -> CheckReport {
        let mut report = CheckReport {
            total_blocks: catalog.blocks.len(),
            normalized: ids_normalized(catalog),
            has_metadata: catalog.metadata.ids_normalized.is_some(),
            ..Default::default()
        };
        for block in &catalog.blocks {
            if block.id.starts_with("block_") {
                report.block_ids += 1;
            } else if block.id.starts_with("det_") {
                report.det_ids += 1;
            } else if block.id.starts_with("mrg_") {
                report.mrg_ids += 1;
            } else {
                report.other_ids += 1;
            }
        }
        report
    }

    /// Repair a catalog in memory.
    pub fn repair(&self, catalog: &Catalog) -> Result<RepairOutcome> {
        let page_count = catalog
            .blocks
            .iter()
            .map(|b| b.page_index + 1)
            .max()
            .unwrap_or(0)
            .max(catalog.pages.len());
        let members: Vec<Vec<usize>> = (0..page_count)
            .map(|p| (0..catalog.blocks.len()).filter(|&i| catalog.blocks[i].page_index == p).collect())
            .collect();

        let mut repaired = catalog.clone();
        let mut id_mapping = IndexMap::new();
        let rename = !ids_normalized(catalog);

        if rename {
            let mut new_ids = vec![String::new(); catalog.blocks.len()];
            for (page, members) in members.iter().enumerate() {
                let numbering = self.numbering(catalog, page, members)?;
                for (ordinal, &index) in numbering.iter().enumerate() {
                    new_ids[index] = final_id(page, ordinal);
                }
            }
            for (block, new_id) in repaired.blocks.iter_mut().zip(new_ids) {
                if block.id == new_id {
                    continue;
                }
                id_mapping.entry(block.id.clone()).or_insert_with(|| new_id.clone());
                if block.metadata.original_id.is_none() {
                    block.metadata.original_id = Some(block.id.clone());
                }
                block.metadata.normalized = Some(true);
                block.id = new_id;
            }
            let live: HashSet<String> = repaired.blocks.iter().map(|b| b.id.clone()).collect();
            let map = |id: &String| -> Option<String> {
                id_mapping.get(id).cloned().or_else(|| live.contains(id).then(|| id.clone()))
            };
            for block in repaired.blocks.iter_mut() {
                if let Some(parent) = block.metadata.parent_id.take() {
                    block.metadata.parent_id = Some(map(&parent).unwrap_or(parent));
                }
                for source in block.metadata.merged_from.iter_mut() {
                    if let Some(mapped) = id_mapping.get(source.as_str()) {
                        *source = mapped.clone();
                    }
                }
            }
            repaired.reading_order = catalog
                .reading_order
                .iter()
                .map(|ids| ids.iter().map(|id| map(id).unwrap_or_else(|| id.clone())).collect())
                .collect();
            log::info!("renamed {} block ids", id_mapping.len());
        }

        let mut rebuilt_pages = Vec::new();
        repaired.reading_order.resize(page_count, Vec::new());
        for (page, members) in members.iter().enumerate() {
            if !order_is_sound(&repaired, page, &repaired.reading_order[page]) {
                log::warn!("page {}: rebuilding reading order", page);
                let order: Vec<String> = self
                    .strategy_order(&repaired, page, members)?
                    .into_iter()
                    .map(|i| repaired.blocks[i].id.clone())
                    .collect();
                repaired.reading_order[page] = order;
                rebuilt_pages.push(page);
            }
        }

        let changed = repaired != *catalog;
        if changed && !id_mapping.is_empty() {
            repaired.metadata.ids_normalized = Some(true);
            repaired.metadata.normalization_date = Some(Utc::now().to_rfc3339());
            repaired.metadata.id_mapping_count = Some(id_mapping.len());
        }

        Ok(RepairOutcome {
            catalog: repaired,
            changed,
            id_mapping,
            rebuilt_pages,
        })
    }

    /// Repair `content.json` in place. Backs the file up first when it changes.
    pub fn repair_file(&self, path: &Path) -> Result<RepairOutcome> {
        let raw = std::fs::read_to_string(path)?;
        let catalog = Catalog::from_json(&raw)?;
        let outcome = self.repair(&catalog)?;

        if !outcome.changed {
            log::info!("{}: already normalized", path.display());
            return Ok(outcome);
        }
        for violation in validate_all(&outcome.catalog, f32::INFINITY) {
            log::warn!("{}: still violates {}", path.display(), violation);
        }
        if self.backup {
            let backup = backup_path(path);
            std::fs::write(&backup, &raw)?;
            log::info!("backup written to {}", backup.display());
        }
        write_json(path, &outcome.catalog)?;
        Ok(outcome)
    }

    /// Repair every `<doc>/extracted/content.json` under `cache_dir`.
    pub fn repair_directory(&self, cache_dir: &Path) -> Result<DirectoryReport> {
        let mut report = DirectoryReport::default();
        for (doc_id, path) in document_catalogs(cache_dir)? {
            report.total += 1;
            match self.repair_file(&path) {
                Ok(outcome) if outcome.changed => report.repaired += 1,
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    log::error!("{}: {}", doc_id, e);
                    report.errors += 1;
                },
            }
        }
        Ok(report)
    }

    /// Indices into `catalog.blocks` for one page: reading order, then
    /// decorative blocks top-to-bottom.
    fn numbering(&self, catalog: &Catalog, page: usize, members: &[usize]) -> Result<Vec<usize>> {
        let mut order = self.strategy_order(catalog, page, members)?;
        let placed: HashSet<usize> = order.iter().copied().collect();
        let mut rest: Vec<usize> = members.iter().copied().filter(|i| !placed.contains(i)).collect();
        rest.sort_by(|&a, &b| catalog.blocks[a].bbox.lexicographic_cmp(&catalog.blocks[b].bbox).then(a.cmp(&b)));
        order.extend(rest);
        Ok(order)
    }

    fn strategy_order(&self, catalog: &Catalog, page: usize, members: &[usize]) -> Result<Vec<usize>> {
        let position: HashMap<&str, usize> = members
            .iter()
            .enumerate()
            .map(|(pos, &i)| (catalog.blocks[i].id.as_str(), pos))
            .collect();
        let items: Vec<OrderItem> = members
            .iter()
            .map(|&i| {
                let block = &catalog.blocks[i];
                let item = OrderItem::new(block.bbox, block.role);
                match block.metadata.parent_id.as_deref().and_then(|p| position.get(p)) {
                    Some(&parent) => item.with_parent(parent),
                    None => item,
                }
            })
            .collect();

        let (width, height) = match catalog.pages.get(page) {
            Some(info) => (info.pixel_width as f32, info.pixel_height as f32),
            None => items
                .iter()
                .fold((0.0f32, 0.0f32), |(w, h), item| (w.max(item.bbox.x2), h.max(item.bbox.y2))),
        };
        let context = ReadingOrderContext::new().with_page(page).with_size(width, height);
        let order = self.strategy.apply(&items, &context)?;
        Ok(order.into_iter().map(|pos| members[pos]).collect())
    }
}

/// Every id is distinct and well-formed for its own page.
fn ids_normalized(catalog: &Catalog) -> bool {
    let mut seen = HashSet::new();
    catalog.blocks.iter().all(|b| {
        matches!(parse_final_id(&b.id), Some((p, _)) if p == b.page_index) && seen.insert(b.id.as_str())
    })
}

/// Does `order` list every non-decorative block of `page` exactly once and nothing foreign?
fn order_is_sound(catalog: &Catalog, page: usize, order: &[String]) -> bool {
    let mut seen = HashSet::new();
    for id in order {
        match catalog.block(id) {
            Some(block) if block.page_index == page && seen.insert(id.as_str()) => {},
            _ => return false,
        }
    }
    catalog
        .blocks_on_page(page)
        .filter(|b| !b.role.is_decorative())
        .all(|b| seen.contains(b.id.as_str()))
}

/// `content.json` → `content.backup_YYYYmmdd_HHMMSS.json`.
fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "content".to_string());
    path.with_file_name(format!("{}.backup_{}.json", stem, Local::now().format("%Y%m%d_%H%M%S")))
}

/// `(doc_id, content.json)` for every document directory under `cache_dir`, sorted by id.
pub fn document_catalogs(cache_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(cache_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path().join("extracted").join("content.json");
        if path.is_file() {
            found.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Block, BlockRole, PageInfo};
    use crate::geometry::BBox;

    fn legacy() -> Catalog {
        let page = PageInfo::from_points(0, 612.0, 792.0, 72);
        let mut caption = Block::new("det_9", 0, BlockRole::Text, BBox::new(60.0, 420.0, 280.0, 440.0))
            .with_text("Figure 1");
        caption.metadata.parent_id = Some("mrg_2".to_string());
        Catalog {
            pages: vec![page],
            blocks: vec![
                Block::new("det_5", 0, BlockRole::Text, BBox::new(320.0, 50.0, 560.0, 300.0)).with_text("right"),
                Block::new("mrg_2", 0, BlockRole::Figure, BBox::new(50.0, 200.0, 290.0, 410.0)),
                caption,
                Block::new("det_1", 0, BlockRole::Title, BBox::new(50.0, 40.0, 290.0, 90.0)).with_text("Title"),
                Block::new("det_7", 0, BlockRole::Separator, BBox::new(50.0, 700.0, 560.0, 704.0)),
            ],
            reading_order: vec![vec![
                "det_1".to_string(),
                "mrg_2".to_string(),
                "det_9".to_string(),
                "det_5".to_string(),
            ]],
            ..Default::default()
        }
    }

    #[test]
    fn test_check_counts_id_kinds() {
        let report = CatalogRepairer::new().check(&legacy());
        assert_eq!(report.total_blocks, 5);
        assert_eq!(report.det_ids, 4);
        assert_eq!(report.mrg_ids, 1);
        assert!(!report.normalized);
        assert!(!report.has_metadata);
    }

    #[test]
    fn test_ids_follow_reading_order_policy() {
        let outcome = CatalogRepairer::new().repair(&legacy()).unwrap();
        assert!(outcome.changed);
        let ids: Vec<(&str, &str)> = outcome
            .catalog
            .blocks
            .iter()
            .map(|b| (b.metadata.original_id.as_deref().unwrap(), b.id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("det_5", "block_0_003"),
                ("mrg_2", "block_0_001"),
                ("det_9", "block_0_002"),
                ("det_1", "block_0_000"),
                ("det_7", "block_0_004"),
            ]
        );
        assert_eq!(outcome.catalog.blocks[2].metadata.parent_id.as_deref(), Some("block_0_001"));
        assert_eq!(
            outcome.catalog.reading_order[0],
            vec!["block_0_000", "block_0_001", "block_0_002", "block_0_003"]
        );
        assert_eq!(outcome.catalog.metadata.ids_normalized, Some(true));
        assert_eq!(outcome.catalog.metadata.id_mapping_count, Some(5));
        assert!(outcome.rebuilt_pages.is_empty());
    }

    #[test]
    fn test_broken_order_is_rebuilt() {
        let mut catalog = legacy();
        catalog.reading_order[0] = vec!["det_1".to_string(), "gone".to_string()];
        let outcome = CatalogRepairer::new().repair(&catalog).unwrap();
        assert_eq!(outcome.rebuilt_pages, vec![0]);
        assert_eq!(
            outcome.catalog.reading_order[0],
            vec!["block_0_000", "block_0_001", "block_0_002", "block_0_003"]
        );
    }

    #[test]
    fn test_second_repair_is_a_no_op() {
        let repairer = CatalogRepairer::new();
        let first = repairer.repair(&legacy()).unwrap();
        let second = repairer.repair(&first.catalog).unwrap();
        assert!(!second.changed);
        assert!(second.id_mapping.is_empty());
        assert_eq!(second.catalog, first.catalog);
    }

    #[test]
    fn test_normalized_ids_are_kept() {
        let bbox = BBox::new(10.0, 10.0, 100.0, 40.0);
        let catalog = Catalog {
            pages: vec![PageInfo::from_points(0, 612.0, 792.0, 72)],
            blocks: vec![
                Block::new("block_0_000", 0, BlockRole::Text, bbox.scale(1.0, 5.0)),
                Block::new("block_0_001", 0, BlockRole::Text, bbox),
            ],
            reading_order: vec![vec!["block_0_000".to_string(), "block_0_001".to_string()]],
            ..Default::default()
        };
        let outcome = CatalogRepairer::new().repair(&catalog).unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.catalog, catalog);
    }

    #[test]
    fn test_repair_file_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = dir.path().join("doc").join("extracted");
        std::fs::create_dir_all(&extracted).unwrap();
        let path = extracted.join("content.json");
        std::fs::write(&path, legacy().to_json().unwrap()).unwrap();

        let report = CatalogRepairer::new().repair_directory(dir.path()).unwrap();
        assert_eq!(report, DirectoryReport { total: 1, repaired: 1, unchanged: 0, errors: 0 });

        let backups: Vec<String> = std::fs::read_dir(&extracted)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("content.backup_"))
            .collect();
        assert_eq!(backups.len(), 1);

        let again = CatalogRepairer::new().with_backup(false).repair_directory(dir.path()).unwrap();
        assert_eq!(again.unchanged, 1);
    }
}
