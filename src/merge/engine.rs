// Merge engine: compare two containers, apply a strategy, build the output.
//
// Pipeline: base copy (10%) -> substitutions + additions (50%) -> save (80%)
// -> done (100%). Inputs are never mutated; payloads are shared with the
// output by reference count.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::compare::compare;
use super::strategy::{MergeOptions, Source, Strategy};
use crate::dbpf::{Container, Resource, ResourceKey, SaveOptions};
use crate::io::{self, SaveStats};

/// Progress sink: `(message, percent)`, percent in `0..=100` or `-1` when
/// indeterminate.
pub type ProgressFn<'a> = Box<dyn FnMut(&str, i32) + 'a>;

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub success: bool,
    /// Output resources taken from the newer save.
    pub from_newer: usize,
    /// Output resources taken from the older save.
    pub from_older: usize,
    /// Resources in the output.
    pub total: usize,
    /// Advisory notes: heuristic substitutions, ignored overrides, backups.
    pub warnings: Vec<String>,
    /// Hard failures (save I/O).
    pub errors: Vec<String>,
    /// Where the output was written, if it was.
    pub output: Option<PathBuf>,
    pub backup: Option<PathBuf>,
    pub saved: Option<SaveStats>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Path-level merge settings.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Copy an existing output file aside before overwriting it.
    pub backup: bool,
    pub save: SaveOptions,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            backup: true,
            save: SaveOptions::default(),
        }
    }
}

#[derive(Default)]
pub struct MergeEngine<'a> {
    progress: Option<ProgressFn<'a>>,
}

impl<'a> MergeEngine<'a> {
    pub fn new() -> Self {
        Self { progress: None }
    }

    /// Engine that reports progress to `f`.
    pub fn with_progress(f: impl FnMut(&str, i32) + 'a) -> Self {
        Self {
            progress: Some(Box::new(f)),
        }
    }

    fn report(&mut self, message: &str, percent: i32) {
        if let Some(f) = self.progress.as_mut() {
            f(message, percent);
        }
    }

    /// Merge with default options.
    pub fn merge(
        &mut self,
        newer: &Container,
        older: &Container,
        strategy: Strategy,
    ) -> (Container, MergeResult) {
        self.merge_with(newer, older, strategy, &MergeOptions::default())
    }

    /// Merge `older` into `newer` under `strategy`.
    pub fn merge_with(
        &mut self,
        newer: &Container,
        older: &Container,
        strategy: Strategy,
        opts: &MergeOptions,
    ) -> (Container, MergeResult) {
        let (merged, result) = self.assemble(newer, older, strategy, opts);
        self.report("Merge complete", 100);
        (merged, result)
    }

    /// Merge, then write the output to `path`.
    ///
    /// A save failure does not lose the merge: the container is still
    /// returned, with `success == false` and the error in `errors`.
    pub fn merge_to_path(
        &mut self,
        newer: &Container,
        older: &Container,
        strategy: Strategy,
        opts: &MergeOptions,
        path: &Path,
        output: &OutputOptions,
    ) -> (Container, MergeResult) {
        let (merged, mut result) = self.assemble(newer, older, strategy, opts);

        self.report("Saving merged container", 80);
        if output.backup {
            match io::create_backup(path) {
                Ok(Some(backup)) => {
                    result.warnings.push(format!("backup created: {}", backup.display()));
                    result.backup = Some(backup);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("backup of {} failed: {e}", path.display());
                    result.errors.push(format!("backup failed: {e}"));
                    result.success = false;
                    return (merged, result);
                }
            }
        }

        match io::save_container(&merged, path, &output.save) {
            Ok(stats) => {
                result.output = Some(path.to_path_buf());
                result.saved = Some(stats);
            }
            Err(e) => {
                log::error!("saving {} failed: {e}", path.display());
                result.errors.push(format!("save failed: {e}"));
                result.success = false;
                return (merged, result);
            }
        }

        self.report("Merge complete", 100);
        (merged, result)
    }

    fn assemble(
        &mut self,
        newer: &Container,
        older: &Container,
        strategy: Strategy,
        opts: &MergeOptions,
    ) -> (Container, MergeResult) {
        self.report("Merging containers", 0);
        let summary = compare(newer, older);
        let plan = strategy.plan(&summary, newer, older, opts);

        let (base, other) = match plan.base {
            Source::Newer => (newer, older),
            Source::Older => (older, newer),
        };
        let mut out = Assembly::new(base);

        self.report("Copying base resources", 10);
        for resource in base.resources() {
            let key = resource.key;
            match other.get(&key) {
                Some(replacement) if plan.substitute.contains(&key) => {
                    out.put(replacement, plan.base.other());
                }
                _ => out.put(resource, plan.base),
            }
        }

        self.report("Adding missing resources", 50);
        let only_other = match plan.base {
            Source::Newer => &summary.only_b,
            Source::Older => &summary.only_a,
        };
        for resource in other.resources() {
            if !only_other.contains(&resource.key) {
                continue;
            }
            if let Some(only) = &opts.only_add
                && !only.contains(&resource.key)
            {
                continue;
            }
            out.put(resource, plan.base.other());
        }

        let mut warnings = plan.advisories;
        apply_overrides(&mut out, newer, older, opts, &mut warnings);

        let (merged, provenance) = out.finish();
        let from_newer = provenance.values().filter(|s| **s == Source::Newer).count();
        let result = MergeResult {
            success: true,
            from_newer,
            from_older: provenance.len() - from_newer,
            total: merged.len(),
            warnings,
            ..MergeResult::default()
        };

        log::info!(
            "merge ({strategy}): {} resources, {} from newer, {} from older, {} advisories",
            result.total,
            result.from_newer,
            result.from_older,
            result.warnings.len()
        );
        (merged, result)
    }
}

/// Output container plus the source of every key in it.
struct Assembly {
    container: Container,
    provenance: HashMap<ResourceKey, Source>,
}

impl Assembly {
    fn new(base: &Container) -> Self {
        Self {
            container: Container::with_header(*base.header()),
            provenance: HashMap::with_capacity(base.len()),
        }
    }

    fn put(&mut self, resource: &Resource, source: Source) {
        self.container.insert(resource.clone());
        self.provenance.insert(resource.key, source);
    }

    fn finish(self) -> (Container, HashMap<ResourceKey, Source>) {
        (self.container, self.provenance)
    }
}

/// Apply `opts.overrides` on top of whatever the strategy chose.
fn apply_overrides(
    out: &mut Assembly,
    newer: &Container,
    older: &Container,
    opts: &MergeOptions,
    warnings: &mut Vec<String>,
) {
    let mut keys: Vec<_> = opts.overrides.iter().collect();
    keys.sort_by_key(|(k, _)| **k);

    for (key, &wanted) in keys {
        let pick = |s: Source| match s {
            Source::Newer => newer.get(key),
            Source::Older => older.get(key),
        };
        if let Some(resource) = pick(wanted) {
            log::debug!("override: {key} from {wanted}");
            out.put(resource, wanted);
            continue;
        }
        let fallback = wanted.other();
        match pick(fallback) {
            Some(resource) => {
                warnings.push(format!(
                    "{key}: not in {wanted} save, keeping {fallback} version"
                ));
                // Re-added in case `only_add` filtered it out.
                out.put(resource, fallback);
            }
            None => warnings.push(format!("{key}: override names a key in neither save")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
