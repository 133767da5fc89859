//! Watch rebuild planning.

use std::path::PathBuf;

use crate::config::KilnConfig;
use crate::graph::BuildGraph;
use crate::utils::path::normalize_path;
use crate::watch::{ChangeEvent, ChangeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildPlan {
    /// No change touches the graph or the html template.
    Nothing,
    /// Rediscover the graph, with the reason.
    Full(&'static str),
    /// Re-read these files and rerun them with their dependents.
    Scoped(Vec<PathBuf>),
}

/// Decide how to react to a batch of changes.
///
/// Without a graph (the last discovery failed) any change triggers a full
/// build, since it may be the fix. Otherwise files outside the graph are
/// ignored, except the html template which reruns the plugins.
pub fn plan(events: &[ChangeEvent], graph: Option<&BuildGraph>, config: &KilnConfig) -> RebuildPlan {
    if events.is_empty() {
        return RebuildPlan::Nothing;
    }
    let Some(graph) = graph else {
        return RebuildPlan::Full("previous graph build failed");
    };

    let template = config
        .html
        .template
        .as_deref()
        .filter(|_| config.has_plugin("html"));

    let mut changed = Vec::new();
    for event in events {
        let path = normalize_path(&event.path);
        if path == config.config_path {
            crate::log!("watch"; "config changed, restart to apply it");
            continue;
        }

        let in_graph = graph.contains(&path);
        match event.kind {
            ChangeKind::Removed if in_graph => return RebuildPlan::Full("asset removed"),
            _ if in_graph || template == Some(path.as_path()) => changed.push(path),
            _ => crate::debug!("watch"; "ignoring {} ({})", path.display(), event.kind.label()),
        }
    }

    if changed.is_empty() {
        RebuildPlan::Nothing
    } else {
        RebuildPlan::Scoped(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::core::BuildMode;
    use crate::graph::{GraphBuilder, Resolver};
    use crate::transform::TransformRegistry;

    struct Project {
        _dir: TempDir,
        config: KilnConfig,
        graph: BuildGraph,
    }

    fn project() -> Project {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/index.js"), "import './util.js';\n").unwrap();
        fs::write(root.join("src/util.js"), "export const x = 1;\n").unwrap();
        fs::write(root.join("src/page.html"), "<html></html>").unwrap();
        let config = KilnConfig::from_str(
            "plugins = [\"html\"]\n[html]\ntemplate = \"src/page.html\"",
            &root,
        )
        .unwrap();

        let registry = TransformRegistry::from_config(&config, BuildMode::Development).unwrap();
        let graph = GraphBuilder::new(&registry, Resolver::default())
            .build(&config.entry)
            .unwrap();
        Project { _dir: dir, config, graph }
    }

    fn event(config: &KilnConfig, rel: &str, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent::new(config.root.join(rel), kind)
    }

    #[test]
    fn test_graph_modification_is_scoped() {
        let p = project();
        let events = [event(&p.config, "src/util.js", ChangeKind::Modified)];
        assert_eq!(
            plan(&events, Some(&p.graph), &p.config),
            RebuildPlan::Scoped(vec![p.config.root.join("src/util.js")])
        );
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let p = project();
        let events = [
            event(&p.config, "README.md", ChangeKind::Modified),
            event(&p.config, "src/new.js", ChangeKind::Created),
        ];
        assert_eq!(plan(&events, Some(&p.graph), &p.config), RebuildPlan::Nothing);
        assert_eq!(plan(&[], Some(&p.graph), &p.config), RebuildPlan::Nothing);
    }

    #[test]
    fn test_removed_asset_needs_full_build() {
        let p = project();
        let events = [event(&p.config, "src/util.js", ChangeKind::Removed)];
        assert!(matches!(plan(&events, Some(&p.graph), &p.config), RebuildPlan::Full(_)));
    }

    #[test]
    fn test_template_change_is_scoped() {
        let p = project();
        let events = [event(&p.config, "src/page.html", ChangeKind::Modified)];
        assert_eq!(
            plan(&events, Some(&p.graph), &p.config),
            RebuildPlan::Scoped(vec![p.config.root.join("src/page.html")])
        );
    }

    #[test]
    fn test_any_change_after_failed_discovery_is_full() {
        let p = project();
        let events = [event(&p.config, "src/new.js", ChangeKind::Created)];
        assert!(matches!(plan(&events, None, &p.config), RebuildPlan::Full(_)));
    }
}
