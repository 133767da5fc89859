use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use super::*;
use crate::core::BuildMode;
use crate::emit::naming::Naming;
use crate::graph::{GraphBuilder, Reload, Resolver};
use crate::transform::{FnTransform, Pattern, Rule, Transform, TransformChain};
use crate::utils::path::normalize_path;

type Calls = Arc<Mutex<Vec<String>>>;

/// Test transform over `.txt` files.
///
/// `@dep <specifier>` lines are references and are rewritten to the
/// dependency's URL; `FAIL` fails the step and `PANIC` panics in it. Every
/// invocation is recorded by file name.
fn counting(calls: Calls) -> Arc<dyn Transform> {
    let transform = FnTransform::new("count", move |asset: Asset| {
        let name = asset
            .meta
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        calls.lock().push(name.clone());

        let text = asset.text()?;
        if text.contains("FAIL") {
            anyhow::bail!("refusing {name}");
        }
        if text.contains("PANIC") {
            panic!("boom in {name}");
        }

        let mut out = String::new();
        for line in text.lines() {
            match line.strip_prefix("@dep ") {
                Some(specifier) => {
                    let url = asset
                        .meta
                        .url_for(specifier)
                        .ok_or_else(|| anyhow::anyhow!("{specifier} not resolved"))?;
                    out.push_str(&format!("@dep {url}\n"));
                }
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(asset.with_text(out))
    })
    .with_references(|content| {
        String::from_utf8_lossy(content)
            .lines()
            .filter_map(|line| line.strip_prefix("@dep ").map(str::to_string))
            .collect()
    });
    Arc::new(transform)
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    registry: TransformRegistry,
    cache: IncrementalCache,
    calls: Calls,
}

impl Fixture {
    fn new(mode: BuildMode, files: &[(&str, &str)]) -> Self {
        Self::with_rules(mode, files, |_, _| {})
    }

    /// `extra` may register rules ahead of the `.txt` rule.
    fn with_rules(
        mode: BuildMode,
        files: &[(&str, &str)],
        extra: impl FnOnce(&mut TransformRegistry, &Calls),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        for (path, content) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let calls = Calls::default();
        let mut registry = TransformRegistry::new(mode);
        extra(&mut registry, &calls);
        registry.register(
            Pattern::extensions(["txt"]),
            TransformChain::new(vec![counting(Arc::clone(&calls))]),
        );

        Self {
            _dir: dir,
            root,
            registry,
            cache: IncrementalCache::new(),
            calls,
        }
    }

    fn graph(&self) -> BuildGraph {
        GraphBuilder::new(&self.registry, Resolver::default())
            .build(&self.root.join("src/main.txt"))
            .unwrap()
    }

    fn emitter(&self) -> OutputEmitter {
        OutputEmitter::new(&self.root.join("dist"), &self.root)
    }

    fn run(&self, graph: &BuildGraph, options: SchedulerOptions) -> Result<Generation, BuildError> {
        let emitter = self.emitter();
        Scheduler::new(graph, &self.registry, &self.cache, &emitter)
            .with_options(options)
            .run()
    }

    fn index(&self, graph: &BuildGraph, rel: &str) -> NodeIndex {
        graph.lookup(&self.root.join(rel)).unwrap()
    }

    fn write(&self, rel: &str, content: &str) {
        fs::write(self.root.join(rel), content).unwrap();
    }

    /// Recorded invocations, sorted, and reset.
    fn take_calls(&self) -> Vec<String> {
        let mut calls = std::mem::take(&mut *self.calls.lock());
        calls.sort();
        calls
    }

    fn rel(&self, path: &std::path::Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn parallel() -> SchedulerOptions {
    SchedulerOptions {
        jobs: 4,
        fail_fast: false,
    }
}

fn serial(fail_fast: bool) -> SchedulerOptions {
    SchedulerOptions { jobs: 1, fail_fast }
}

fn diamond(mode: BuildMode) -> Fixture {
    Fixture::new(
        mode,
        &[
            ("src/main.txt", "@dep ./a.txt\n@dep ./b.txt\nmain\n"),
            ("src/a.txt", "@dep ./shared/c.txt\na\n"),
            ("src/b.txt", "@dep ./shared/c.txt\nb\n"),
            ("src/shared/c.txt", "c\n"),
        ],
    )
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_each_node_runs_once_after_its_dependencies() {
    let fx = diamond(BuildMode::Development);
    let graph = fx.graph();

    let generation = fx.run(&graph, parallel()).unwrap();

    let order = fx.calls.lock().clone();
    assert_eq!(order.len(), 4);
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("c.txt") < pos("a.txt"));
    assert!(pos("c.txt") < pos("b.txt"));
    assert!(pos("a.txt") < pos("main.txt"));
    assert!(pos("b.txt") < pos("main.txt"));

    assert_eq!(generation.stats.transformed, 4);
    assert!(generation.is_healthy());
    assert_eq!(generation.manifest.get("src/main.txt"), Some("bundle.js"));
    assert_eq!(generation.manifest.get("src/shared/c.txt"), Some("shared/c.txt"));

    let a = fs::read_to_string(fx.root.join("dist/a.txt")).unwrap();
    assert_eq!(a, "@dep /shared/c.txt\na\n");
}

#[test]
fn test_dependency_urls_carry_content_hash_in_prod() {
    let fx = diamond(BuildMode::Production);
    let graph = fx.graph();
    let generation = fx.run(&graph, parallel()).unwrap();

    let c = generation
        .outcome(fx.index(&graph, "src/shared/c.txt"))
        .entry()
        .unwrap()
        .clone();
    assert_eq!(c.output, format!("shared/c.{}.txt", c.digest.short(8)));

    let main = fs::read_to_string(fx.root.join("dist/bundle.js")).unwrap();
    let a_url = &generation
        .outcome(fx.index(&graph, "src/a.txt"))
        .entry()
        .unwrap()
        .url;
    assert!(main.contains(&format!("@dep {a_url}")));
}

// =============================================================================
// Incremental
// =============================================================================

#[test]
fn test_warm_rerun_transforms_nothing() {
    let fx = diamond(BuildMode::Production);
    let graph = fx.graph();

    let first = fx.run(&graph, parallel()).unwrap();
    assert_eq!(fx.take_calls().len(), 4);

    let second = fx.run(&graph, parallel()).unwrap();
    assert!(fx.take_calls().is_empty());
    assert_eq!(second.stats.cached, 4);
    assert_eq!(second.manifest, first.manifest);
}

#[test]
fn test_leaf_change_reruns_leaf_and_dependents() {
    let fx = Fixture::new(
        BuildMode::Production,
        &[
            ("src/main.txt", "@dep ./a.txt\n@dep ./b.txt\n"),
            ("src/a.txt", "@dep ./c.txt\n"),
            ("src/b.txt", "b\n"),
            ("src/c.txt", "c\n"),
        ],
    );
    let mut graph = fx.graph();
    let previous = fx.run(&graph, parallel()).unwrap();
    fx.take_calls();

    fx.write("src/c.txt", "c changed\n");
    let builder = GraphBuilder::new(&fx.registry, Resolver::default());
    let changed = match builder.reload(&mut graph, &[fx.root.join("src/c.txt")]).unwrap() {
        Reload::Superseded(changed) => changed,
        Reload::Restructured => panic!("content-only change must not restructure"),
    };
    assert_eq!(changed, vec![fx.index(&graph, "src/c.txt")]);

    let emitter = fx.emitter();
    let next = Scheduler::new(&graph, &fx.registry, &fx.cache, &emitter)
        .with_options(parallel())
        .run_scoped(&previous, &changed)
        .unwrap();

    assert_eq!(fx.take_calls(), vec!["a.txt", "c.txt", "main.txt"]);
    assert_eq!(next.stats.transformed, 3);
    assert_eq!(next.stats.reused, 1);
    assert_eq!(next.manifest.len(), 4);
    assert_ne!(next.manifest.get("src/c.txt"), previous.manifest.get("src/c.txt"));
    assert_eq!(next.manifest.get("src/b.txt"), previous.manifest.get("src/b.txt"));
}

#[test]
fn test_full_run_after_leaf_change_hits_cache_elsewhere() {
    let fx = diamond(BuildMode::Production);
    let graph = fx.graph();
    fx.run(&graph, parallel()).unwrap();
    fx.take_calls();

    fx.write("src/b.txt", "@dep ./shared/c.txt\nb changed\n");
    let graph = fx.graph();
    let generation = fx.run(&graph, parallel()).unwrap();

    assert_eq!(fx.take_calls(), vec!["b.txt", "main.txt"]);
    assert_eq!(generation.stats.cached, 2);
}

#[test]
fn test_unchanged_output_stops_propagation() {
    // Dev URLs carry no hash, so a dependency whose output bytes are
    // unchanged leaves its dependents' keys alone.
    let fx = Fixture::new(
        BuildMode::Development,
        &[
            ("src/main.txt", "@dep ./a.txt\n"),
            ("src/a.txt", "@dep ./c.txt\n"),
            ("src/c.txt", "c\n"),
        ],
    );
    fx.run(&fx.graph(), parallel()).unwrap();
    fx.take_calls();

    fx.write("src/c.txt", "c changed\n");
    let generation = fx.run(&fx.graph(), parallel()).unwrap();

    // a's output still reads "@dep /c.txt", so main is served from cache
    assert_eq!(fx.take_calls(), vec!["a.txt", "c.txt"]);
    assert_eq!(generation.stats.cached, 1);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_failures_aggregated_independent_subtree_succeeds() {
    let fx = Fixture::new(
        BuildMode::Development,
        &[
            ("src/main.txt", "@dep ./a.txt\n@dep ./b.txt\n@dep ./ok.txt\n"),
            ("src/a.txt", "@dep ./x.txt\n"),
            ("src/b.txt", "@dep ./y.txt\n"),
            ("src/x.txt", "FAIL\n"),
            ("src/y.txt", "FAIL\n"),
            ("src/ok.txt", "fine\n"),
        ],
    );
    let graph = fx.graph();

    let err = fx.run(&graph, parallel()).unwrap_err();
    assert!(!err.cancelled);

    let failed: Vec<String> = err.failed().map(|f| fx.rel(&f.asset)).collect();
    assert_eq!(failed, vec!["src/x.txt", "src/y.txt"]);

    let skipped: Vec<String> = err.skipped().map(|f| fx.rel(&f.asset)).collect();
    assert_eq!(skipped, vec!["src/main.txt", "src/a.txt", "src/b.txt"]);

    let main = err.skipped().next().unwrap();
    match &main.kind {
        FailureKind::SkippedDueToDependencyFailure {
            dependency,
            root_cause,
        } => {
            assert_eq!(fx.rel(dependency), "src/a.txt");
            assert_eq!(fx.rel(root_cause), "src/x.txt");
        }
        other => panic!("unexpected {other:?}"),
    }

    // The independent subtree completed and was written
    assert_eq!(err.generation.manifest.get("src/ok.txt"), Some("ok.txt"));
    assert!(fx.root.join("dist/ok.txt").is_file());
    assert_eq!(err.generation.stats.completed(), 1);

    let report = err.to_string();
    assert!(report.starts_with("2 asset(s) failed, 3 skipped"));
    assert!(report.contains("refusing x.txt"));
}

#[test]
fn test_failure_is_retried_next_generation() {
    let fx = Fixture::new(BuildMode::Development, &[("src/main.txt", "FAIL\n")]);
    let graph = fx.graph();
    fx.run(&graph, parallel()).unwrap_err();
    fx.run(&graph, parallel()).unwrap_err();
    assert_eq!(fx.take_calls(), vec!["main.txt", "main.txt"]);
}

#[test]
fn test_fail_fast_cancels_remaining_nodes() {
    let fx = Fixture::new(
        BuildMode::Development,
        &[
            ("src/main.txt", "@dep ./a.txt\n@dep ./b.txt\n"),
            ("src/a.txt", "FAIL\n"),
            ("src/b.txt", "b\n"),
        ],
    );
    let graph = fx.graph();

    let err = fx.run(&graph, serial(true)).unwrap_err();
    assert!(err.cancelled);
    assert_eq!(err.failed().count(), 1);
    assert!(matches!(
        err.generation.outcome(fx.index(&graph, "src/b.txt")),
        NodeOutcome::Cancelled
    ));
    assert_eq!(fx.take_calls(), vec!["a.txt"]);
}

#[test]
fn test_cancelled_token_runs_nothing() {
    let fx = diamond(BuildMode::Development);
    let graph = fx.graph();
    let emitter = fx.emitter();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = Scheduler::new(&graph, &fx.registry, &fx.cache, &emitter)
        .with_cancel(cancel)
        .run()
        .unwrap_err();

    assert!(err.cancelled);
    assert!(err.failures.is_empty());
    assert_eq!(err.generation.stats.cancelled, 4);
    assert!(fx.take_calls().is_empty());
    assert!(err.to_string().starts_with("build cancelled"));
}

#[test]
fn test_panic_reported_as_transform_failure() {
    let fx = Fixture::new(
        BuildMode::Development,
        &[("src/main.txt", "@dep ./a.txt\n"), ("src/a.txt", "PANIC\n")],
    );
    let graph = fx.graph();

    let err = fx.run(&graph, parallel()).unwrap_err();
    let failure = err.failed().next().unwrap();
    assert_eq!(fx.rel(&failure.asset), "src/a.txt");
    match &failure.kind {
        FailureKind::Transform(e) => {
            assert_eq!(e.step, "count");
            assert!(e.to_string().contains("boom in a.txt"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.skipped().count(), 1);
}

#[test]
fn test_output_collision_is_node_failure() {
    let fx = Fixture::with_rules(
        BuildMode::Development,
        &[
            ("src/main.txt", "@dep ./one.dup\n@dep ./two.dup\n"),
            ("src/one.dup", "1"),
            ("src/two.dup", "2"),
        ],
        |registry, _| {
            registry.register_rule(Rule::new(
                Pattern::extensions(["dup"]),
                TransformChain::default(),
                Naming::new("same.bin"),
            ));
        },
    );
    let graph = fx.graph();

    let err = fx.run(&graph, serial(false)).unwrap_err();
    let failure = err.failed().next().unwrap();
    assert_eq!(fx.rel(&failure.asset), "src/two.dup");
    assert!(matches!(&failure.kind, FailureKind::Emit(e) if matches!(**e, crate::emit::EmitError::OutputCollision { .. })));
    assert_eq!(err.generation.manifest.get("src/one.dup"), Some("same.bin"));
    assert_eq!(fs::read(fx.root.join("dist/same.bin")).unwrap(), b"1");
}

#[test]
fn test_verbatim_assets_are_copied() {
    let fx = Fixture::new(
        BuildMode::Development,
        &[("src/main.txt", "@dep ./img/logo.png\n"), ("src/img/logo.png", "PNG")],
    );
    let generation = fx.run(&fx.graph(), parallel()).unwrap();
    assert_eq!(generation.manifest.get("src/img/logo.png"), Some("img/logo.png"));
    assert_eq!(fs::read(fx.root.join("dist/img/logo.png")).unwrap(), b"PNG");
}
