//! Build session: one registry, cache and plugin set across generations.
//!
//! Full build:
//! `before_build` plugins → graph → scheduler → `after_build` plugins →
//! manifest → cache persistence.
//!
//! Watch rebuild: [`plan`](super::recompile::plan) decides between a full
//! build and a scoped run over the changed nodes and their dependents.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;

use super::recompile::{RebuildPlan, plan};
use crate::cache::IncrementalCache;
use crate::config::KilnConfig;
use crate::core::{BuildMode, CancelToken};
use crate::emit::OutputEmitter;
use crate::graph::{BuildGraph, GraphBuilder, NodeIndex, Reload, Resolver};
use crate::logger::ProgressLine;
use crate::plugin::{self, BuildOutput, Plugin, PluginContext};
use crate::scheduler::{Generation, GenerationStats, Scheduler, SchedulerOptions};
use crate::transform::TransformRegistry;
use crate::watch::ChangeEvent;

/// Outcome of a successful generation.
#[derive(Debug, Clone)]
pub struct Summary {
    pub stats: GenerationStats,
    /// Assets in the graph.
    pub assets: usize,
    /// Files actually written (unchanged outputs are skipped).
    pub written: usize,
    pub elapsed: Duration,
    /// A scoped watch rebuild rather than a full build.
    pub scoped: bool,
}

pub struct Session {
    config: KilnConfig,
    mode: BuildMode,
    registry: TransformRegistry,
    resolver: Resolver,
    cache: IncrementalCache,
    plugins: Vec<Box<dyn Plugin>>,
    /// Graph and result of the last generation whose graph could be built.
    last: Option<(BuildGraph, Generation)>,
    /// Extra graph roots: files the html template loads.
    roots: Vec<PathBuf>,
    cancel: CancelToken,
    /// Set after the first build; later builds are watch rebuilds.
    watching: bool,
    quiet: bool,
}

impl Session {
    /// Prepare a session. With `[build] clean` (CLI `--clean`) the output
    /// and cache directories are removed first.
    pub fn new(config: KilnConfig, mode: BuildMode) -> Result<Self> {
        if config.build.clean {
            for dir in [&config.output_dir, &config.build.cache_dir] {
                if dir.exists() {
                    fs::remove_dir_all(dir)
                        .with_context(|| format!("failed to clear {}", dir.display()))?;
                }
            }
        }

        let registry = TransformRegistry::from_config(&config, mode)?;
        let cache = IncrementalCache::load(&config.cache_path()).unwrap_or_else(|e| {
            crate::log!("cache"; "ignoring unreadable cache: {}", e);
            IncrementalCache::new()
        });
        crate::debug!("cache"; "{} entries loaded", cache.len());

        Ok(Self {
            resolver: Resolver::new(config.resolve.extensions.clone()),
            plugins: plugin::from_config(&config),
            config,
            mode,
            registry,
            cache,
            last: None,
            roots: Vec::new(),
            cancel: CancelToken::new(),
            watching: false,
            quiet: false,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Suppress the progress line.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    pub fn cache(&self) -> &IncrementalCache {
        &self.cache
    }

    /// Result of the last generation, if its graph could be built.
    pub fn generation(&self) -> Option<&Generation> {
        self.last.as_ref().map(|(_, generation)| generation)
    }

    /// Discover the graph and process every asset.
    ///
    /// Node failures are returned as a [`BuildError`](crate::scheduler::BuildError)
    /// inside the `anyhow::Error`.
    pub fn build(&mut self) -> Result<Summary> {
        let started = Instant::now();
        let ctx = self.plugin_context();
        for plugin in &self.plugins {
            plugin
                .before_build(&ctx)
                .with_context(|| format!("plugin `{}` failed", plugin.name()))?;
        }

        self.last = None;
        self.roots = plugin::template_assets(&self.config, &self.resolver)?;
        let graph = GraphBuilder::new(&self.registry, self.resolver.clone())
            .build_with_roots(&self.config.entry, &self.roots)?;
        crate::debug!("graph"; "{} assets", graph.len());

        self.generate(graph, None, started)
    }

    /// Apply a batch of file changes. `None` when nothing relevant changed.
    pub fn rebuild(&mut self, events: &[ChangeEvent]) -> Result<Option<Summary>> {
        self.watching = true;
        let started = Instant::now();

        let changed = match plan(events, self.last.as_ref().map(|(g, _)| g), &self.config) {
            RebuildPlan::Nothing => return Ok(None),
            RebuildPlan::Full(reason) => {
                crate::debug!("watch"; "full rebuild: {}", reason);
                return self.build().map(Some);
            }
            RebuildPlan::Scoped(changed) => changed,
        };

        let Some((mut graph, previous)) = self.last.take() else {
            return self.build().map(Some);
        };
        // Only the html template is outside the graph
        let template_changed = changed.iter().any(|path| !graph.contains(path));
        if template_changed && plugin::template_assets(&self.config, &self.resolver)? != self.roots {
            crate::debug!("watch"; "template assets changed, rebuilding graph");
            return self.build().map(Some);
        }

        let builder = GraphBuilder::new(&self.registry, self.resolver.clone());
        let nodes = match builder.reload(&mut graph, &changed)? {
            Reload::Superseded(nodes) => nodes,
            Reload::Restructured => {
                crate::debug!("watch"; "references changed, rebuilding graph");
                return self.build().map(Some);
            }
        };

        // Content identical to what was built, e.g. a save without edits
        if nodes.is_empty() && previous.is_healthy() && !template_changed {
            self.last = Some((graph, previous));
            return Ok(None);
        }

        self.generate(graph, Some((previous, nodes)), started).map(Some)
    }

    fn plugin_context(&self) -> PluginContext<'_> {
        PluginContext {
            config: &self.config,
            mode: self.mode,
            incremental: self.watching,
        }
    }

    /// Run one generation over `graph`, scoped when `previous` is given.
    fn generate(
        &mut self,
        graph: BuildGraph,
        previous: Option<(Generation, Vec<NodeIndex>)>,
        started: Instant,
    ) -> Result<Summary> {
        let emitter = OutputEmitter::new(&self.config.output_dir, &self.config.root);
        let options = SchedulerOptions {
            jobs: self.config.build.worker_count(),
            fail_fast: self.config.build.fail_fast,
        };
        let scoped = previous.is_some();

        // Watch rebuilds report through the status block instead
        let progress = (!self.quiet && !self.watching)
            .then(|| ProgressLine::new(&[("assets", graph.len()), ("cached", 0)]));
        let mut scheduler = Scheduler::new(&graph, &self.registry, &self.cache, &emitter)
            .with_options(options)
            .with_cancel(self.cancel.clone());
        if let Some(progress) = &progress {
            scheduler = scheduler.with_progress(progress);
        }

        let result = match &previous {
            Some((generation, changed)) => scheduler.run_scoped(generation, changed),
            None => scheduler.run(),
        };
        if let Some(progress) = progress {
            progress.finish();
        }

        let generation = match result {
            Ok(generation) => generation,
            Err(err) => {
                self.persist(&graph);
                self.last = Some((graph, err.generation.clone()));
                return Err(err.into());
            }
        };

        let generation = self.finalize(&graph, &emitter, generation)?;
        self.persist(&graph);

        let summary = Summary {
            stats: generation.stats,
            assets: graph.len(),
            written: emitter.written(),
            elapsed: started.elapsed(),
            scoped,
        };
        self.last = Some((graph, generation));
        Ok(summary)
    }

    /// Run `after_build` plugins and write the manifest.
    fn finalize(
        &self,
        graph: &BuildGraph,
        emitter: &OutputEmitter,
        mut generation: Generation,
    ) -> Result<Generation> {
        let entry_url = generation
            .outcome(graph.entry())
            .entry()
            .map(|entry| entry.url.clone())
            .unwrap_or_default();

        let ctx = self.plugin_context();
        let mut artifacts = Vec::new();
        for plugin in &self.plugins {
            let output = BuildOutput {
                entry_url: &entry_url,
                manifest: &generation.manifest,
            };
            let produced = plugin
                .after_build(&ctx, &output)
                .with_context(|| format!("plugin `{}` failed", plugin.name()))?;
            artifacts.extend(produced);
        }

        generation.manifest = emitter.emit_all(&artifacts)?;
        let path = self.config.manifest_path();
        generation
            .manifest
            .write(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(generation)
    }

    /// Drop cache entries of assets that left the graph and save the rest.
    fn persist(&self, graph: &BuildGraph) {
        let live: FxHashSet<PathBuf> = graph.nodes().map(|(_, node)| node.path.clone()).collect();
        let evicted = self.cache.retain(&live);
        if evicted > 0 {
            crate::debug!("cache"; "evicted {} entries", evicted);
        }
        if let Err(e) = self.cache.save(&self.config.cache_path()) {
            crate::log!("cache"; "failed to save cache: {}", e);
        }
    }
}
