//! Tree, selection and search state behind the window, kept free of egui so
//! that worker events can be applied and checked without a frame.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use filetree_core::config::Config;
use filetree_core::search::search;
use filetree_core::{
    CancellationToken, ExpandPlan, MatchMode, PatternSet, SearchLimits, SearchMatch, SearchQuery,
    SearchStats, TreeError, TreeModel, TreeWorker, WorkerEvent,
};

pub const SHORT_MESSAGE: Duration = Duration::from_millis(2500);
pub const FILTER_MESSAGE: Duration = Duration::from_millis(4000);

pub struct ActiveSearch {
    pub id: u64,
    pub matches: usize,
    started: Instant,
}

pub struct StatusMessage {
    pub text: String,
    pub expires: Option<Instant>,
}

pub struct BrowserSession {
    pub config: Config,
    pub tree: TreeModel,
    worker: Option<TreeWorker>,

    pub query: String,
    pub patterns: PatternSet,
    pub show_hidden: bool,
    pub selected: Option<PathBuf>,
    pub matches: HashSet<PathBuf>,
    pub search: Option<ActiveSearch>,
    pub scroll_to_selected: bool,
    pub status: Option<StatusMessage>,
}

impl BrowserSession {
    /// Without a worker every read and search runs on the calling thread.
    pub fn new(config: Config, tree: TreeModel, worker: Option<TreeWorker>) -> Self {
        Self {
            show_hidden: config.appearance.show_hidden,
            patterns: PatternSet::parse(&config.search.default_patterns),
            config,
            tree,
            worker,
            query: String::new(),
            selected: None,
            matches: HashSet::new(),
            search: None,
            scroll_to_selected: false,
            status: None,
        }
    }

    fn root_label(&self) -> String {
        match self.tree.root_path() {
            Some(root) => format!("Root: {}", root.display()),
            None => "No folder".to_string(),
        }
    }

    pub fn show_message(&mut self, text: impl Into<String>, timeout: Option<Duration>) {
        self.status = Some(StatusMessage {
            text: text.into(),
            expires: timeout.map(|t| Instant::now() + t),
        });
    }

    /// The current message, or the root folder once it has expired.
    pub fn status_text(&mut self) -> String {
        let expired = self
            .status
            .as_ref()
            .and_then(|msg| msg.expires)
            .is_some_and(|at| Instant::now() >= at);
        if expired {
            self.status = None;
        }
        match &self.status {
            Some(msg) => msg.text.clone(),
            None => self.root_label(),
        }
    }

    pub fn set_root(&mut self, folder: &Path) {
        match self.tree.set_root(folder) {
            Ok(()) => {
                self.cancel_search();
                self.query.clear();
                self.matches.clear();
                self.selected = None;
                self.status = None;
                if let Some(root) = self.tree.root_path().map(Path::to_path_buf) {
                    self.expand(&root);
                }
            }
            Err(err) => {
                tracing::warn!(folder = %folder.display(), error = %err, "cannot open folder");
                self.show_message(format!("Not a folder: {}", folder.display()), None);
            }
        }
    }

    fn expand(&mut self, path: &Path) {
        let Some(worker) = self.worker.as_mut() else {
            if let Err(err) = self.tree.expand(path) {
                self.report_node_error(path, &err);
            }
            return;
        };
        match self.tree.plan_expand(path) {
            Ok(ExpandPlan::Done) => {}
            Ok(ExpandPlan::NeedsListing) => {
                worker.request_listing(path);
            }
            Err(err) => self.report_node_error(path, &err),
        }
    }

    pub fn toggle(&mut self, path: &Path) {
        let expanded = self.tree.find(path).is_some_and(|n| n.is_expanded());
        if expanded {
            if let Err(err) = self.tree.collapse(path) {
                self.report_node_error(path, &err);
            }
        } else {
            self.expand(path);
        }
    }

    fn report_node_error(&mut self, path: &Path, err: &TreeError) {
        let name = filetree_core::node::display_name(path);
        self.show_message(format!("{name}: {}", err.annotation()), Some(FILTER_MESSAGE));
    }

    pub fn selected_kind(&self) -> Option<(PathBuf, bool)> {
        let path = self.selected.as_ref()?;
        let node = self.tree.find(path)?;
        Some((path.clone(), node.is_dir()))
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.worker.as_ref().is_some_and(|w| w.is_pending(path))
    }

    pub fn is_loading(&self) -> bool {
        self.worker.as_ref().is_some_and(TreeWorker::has_pending)
    }

    pub fn is_busy(&self) -> bool {
        self.search.is_some() || self.is_loading()
    }

    /// Re-reads the selected folder, the folder of the selected file, or the
    /// root when nothing is selected.
    pub fn refresh_selected(&mut self) {
        let target = match self.selected_kind() {
            Some((path, true)) => Some(path),
            Some((path, false)) => path.parent().map(Path::to_path_buf),
            None => self.tree.root_path().map(Path::to_path_buf),
        };
        let Some(target) = target else {
            return;
        };
        if self.is_pending(&target) {
            return;
        }
        match self.tree.refresh(&target) {
            Ok(()) => {
                if self.selected.as_ref().is_some_and(|p| self.tree.find(p).is_none()) {
                    self.selected = None;
                }
            }
            Err(err) => self.report_node_error(&target, &err),
        }
    }

    pub fn apply_patterns(&mut self, raw: &str) {
        let patterns = PatternSet::parse(raw);
        if patterns.is_empty() {
            self.clear_patterns();
            return;
        }
        self.show_message(format!("Filter: {}", patterns.display()), Some(FILTER_MESSAGE));
        self.patterns = patterns;
        self.restart_search();
    }

    pub fn clear_patterns(&mut self) {
        self.patterns = PatternSet::default();
        self.show_message("File pattern filter cleared", Some(SHORT_MESSAGE));
        self.restart_search();
    }

    pub fn cancel_search(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel_search();
        }
        self.search = None;
    }

    /// Starts over for the current query: collapse, then search again from the
    /// root. An empty query only collapses.
    pub fn restart_search(&mut self) {
        self.cancel_search();
        self.matches.clear();

        if self.config.search.collapse_before_search {
            self.tree.collapse_all();
        }
        if self.query.trim().is_empty() || self.tree.root().is_none() {
            return;
        }

        let query = SearchQuery::new(&self.query, self.patterns.clone())
            .with_mode(MatchMode::from(self.config.search.mode));
        let limits = SearchLimits::from_config(&self.config.search, self.show_hidden);

        let Some(worker) = self.worker.as_mut() else {
            self.search_inline(query, limits);
            return;
        };
        match worker.start_search(self.tree.clone(), query, limits) {
            Ok(id) => {
                self.search = Some(ActiveSearch {
                    id,
                    matches: 0,
                    started: Instant::now(),
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot start search");
                self.show_message(format!("Search failed: {err}"), None);
            }
        }
    }

    fn search_inline(&mut self, query: SearchQuery, limits: SearchLimits) {
        let started = Instant::now();
        let mut walk = search(&mut self.tree, query, (), CancellationToken::noop(), limits);
        let found: Vec<SearchMatch> = walk.by_ref().collect();
        let stats = walk.stats();
        for m in found {
            self.on_match(m);
        }
        self.on_search_finished(stats, started);
    }

    fn on_match(&mut self, found: SearchMatch) {
        if let Err(err) = self.tree.reveal(&found.path) {
            tracing::debug!(path = %found.path.display(), error = %err, "cannot reveal match");
        }
        if self.selected.is_none() {
            self.selected = Some(found.path.clone());
            self.scroll_to_selected = true;
        }
        self.matches.insert(found.path);
    }

    fn on_search_finished(&mut self, stats: SearchStats, started: Instant) {
        tracing::debug!(?stats, elapsed = ?started.elapsed(), "search complete");
        let noun = if stats.matches == 1 { "match" } else { "matches" };
        let text = if stats.truncated {
            format!(
                "{} {noun} (stopped after {} entries)",
                stats.matches, stats.visited
            )
        } else {
            format!("{} {noun}", stats.matches)
        };
        self.show_message(text, None);
    }

    fn is_current(&self, search_id: u64) -> bool {
        self.search.as_ref().is_some_and(|s| s.id == search_id)
    }

    /// Applies everything the worker has produced since the last call.
    pub fn handle_worker_events(&mut self) {
        while let Some(event) = self.worker.as_mut().and_then(TreeWorker::try_recv) {
            self.apply_event(event);
        }
    }

    /// Directory listings are installed whichever search read them, since
    /// they are true regardless of the query. Matches and completion only
    /// count for the running search.
    pub fn apply_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Listed { path, listing } => {
                if self.tree.find(&path).is_none() {
                    tracing::debug!(path = %path.display(), "dropping listing for old root");
                    return;
                }
                if let Err(err) = self.tree.install_listing(&path, listing, true) {
                    self.report_node_error(&path, &err);
                }
            }
            WorkerEvent::SearchLoaded { dir, .. } => {
                if let Err(err) = self.tree.install_loaded(&dir) {
                    tracing::debug!(path = %dir.path().display(), error = %err, "search listing not applied");
                }
            }
            WorkerEvent::SearchError { path, error, .. } => {
                tracing::debug!(path = %path.display(), error = %error, "search skipped entry");
            }
            WorkerEvent::SearchMatch { search_id, found } if self.is_current(search_id) => {
                if let Some(active) = self.search.as_mut() {
                    active.matches += 1;
                }
                self.on_match(found);
            }
            WorkerEvent::SearchFinished { search_id, stats } if self.is_current(search_id) => {
                let started = self
                    .search
                    .take()
                    .map(|s| s.started)
                    .unwrap_or_else(Instant::now);
                self.on_search_finished(stats, started);
            }
            WorkerEvent::SearchMatch { search_id, .. } | WorkerEvent::SearchFinished { search_id, .. } => {
                tracing::trace!(search_id, "dropping event from superseded search");
            }
        }
    }
}
