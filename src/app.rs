use std::path::PathBuf;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Key, RichText, ScrollArea};
use filetree_core::config::Config;
use filetree_core::{NodeKind, TreeModel, TreeWorker, ViewOptions, VisibleRow};

use crate::clipboard;
use crate::icon::IconCache;
use crate::launcher;
use crate::session::{BrowserSession, SHORT_MESSAGE};

const ROW_HEIGHT: f32 = 20.0;
const INDENT: f32 = 16.0;
const ICON_SIZE: f32 = 16.0;
const SEARCH_HINT: &str = "Search in current folder (filters by name, case-insensitive)…";
const PATTERN_HINT: &str = "Example: *.py;*.md;*.txt (leave empty to show all)";
// There is no native folder dialog; the prompt takes a typed or pasted path.
const FOLDER_PROMPT_NOTE: &str = "Type or paste the full path of a folder:";
const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const MATCH_COLOR: Color32 = Color32::from_rgb(0xE8, 0xB3, 0x3A);

pub struct AppInit {
    pub config: Config,
    pub root: PathBuf,
}

/// Things a frame asked for. Drawing only records them; they are applied
/// once the panels are done borrowing `self`.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Toggle(PathBuf),
    Select(PathBuf),
    CopyPath,
    Reveal,
    Refresh,
    ChooseFolder,
    FilterPatterns,
    ClearPatterns,
    CollapseAll,
    HiddenToggled,
    ResetSearch,
    Exit,
}

pub struct FileTreeApp {
    session: BrowserSession,
    icons: IconCache,

    folder_prompt: Option<String>,
    pattern_prompt: Option<String>,
    search_has_focus: bool,
    request_focus_search: bool,
    spinner_index: usize,
    last_spinner_tick: Instant,
    should_exit: bool,
}

impl FileTreeApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, init: AppInit) -> Self {
        let tree = TreeModel::with_os_filesystem();
        let worker = match TreeWorker::start(tree.filesystem()) {
            Ok(worker) => Some(worker),
            Err(err) => {
                tracing::error!(error = %err, "background worker unavailable, reading inline");
                None
            }
        };

        let mut app = Self {
            icons: IconCache::new(init.config.appearance.show_icons),
            session: BrowserSession::new(init.config, tree, worker),
            folder_prompt: None,
            pattern_prompt: None,
            search_has_focus: false,
            request_focus_search: true,
            spinner_index: 0,
            last_spinner_tick: Instant::now(),
            should_exit: false,
        };
        app.session.set_root(&init.root);
        app
    }

    fn copy_selected_path(&mut self) {
        let Some(path) = self.session.selected.clone() else {
            return;
        };
        match clipboard::copy_path(&path) {
            Ok(()) => self
                .session
                .show_message(format!("Copied: {}", path.display()), Some(SHORT_MESSAGE)),
            Err(err) => {
                tracing::warn!(error = %err, "clipboard unavailable");
                self.session
                    .show_message(format!("Copy failed: {err}"), Some(SHORT_MESSAGE));
            }
        }
    }

    fn reveal_selected(&mut self) {
        let Some((path, is_dir)) = self.session.selected_kind() else {
            return;
        };
        if let Err(err) = launcher::reveal(&path, is_dir) {
            tracing::warn!(path = %path.display(), error = %err, "cannot open file manager");
            self.session
                .show_message(format!("Cannot open: {err}"), Some(SHORT_MESSAGE));
        }
    }

    fn tick_spinner(&mut self) {
        if !self.session.is_busy() {
            return;
        }
        if self.last_spinner_tick.elapsed() >= Duration::from_millis(120) {
            self.spinner_index = (self.spinner_index + 1) % SPINNER_FRAMES.len();
            self.last_spinner_tick = Instant::now();
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) -> Vec<Action> {
        let mut actions = Vec::new();
        let search_focused = self.search_has_focus;
        ctx.input_mut(|i| {
            if i.consume_key(egui::Modifiers::COMMAND, Key::O) {
                actions.push(Action::ChooseFolder);
            }
            if i.consume_key(egui::Modifiers::COMMAND, Key::Q) {
                actions.push(Action::Exit);
            }
            if i.consume_key(egui::Modifiers::NONE, Key::F5) {
                actions.push(Action::Refresh);
            }
            if i.consume_key(egui::Modifiers::NONE, Key::Escape) {
                actions.push(Action::ResetSearch);
            }
            // The search box keeps Ctrl+C for its own text.
            if !search_focused && i.events.iter().any(|e| matches!(e, egui::Event::Copy)) {
                actions.push(Action::CopyPath);
            }
        });
        actions
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Toggle(path) => {
                self.session.selected = Some(path.clone());
                self.session.toggle(&path);
            }
            Action::Select(path) => self.session.selected = Some(path),
            Action::CopyPath => self.copy_selected_path(),
            Action::Reveal => self.reveal_selected(),
            Action::Refresh => self.session.refresh_selected(),
            Action::ChooseFolder => {
                let start = self
                    .session
                    .tree
                    .root_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                self.folder_prompt = Some(start);
            }
            Action::FilterPatterns => {
                self.pattern_prompt = Some(self.session.patterns.display());
            }
            Action::ClearPatterns => self.session.clear_patterns(),
            Action::CollapseAll => self.session.tree.collapse_all(),
            Action::HiddenToggled => {
                tracing::debug!(show_hidden = self.session.show_hidden, "hidden files toggled");
                // Hidden entries change what a search may reach.
                if !self.session.query.trim().is_empty() {
                    self.session.restart_search();
                }
            }
            Action::ResetSearch => {
                self.session.query.clear();
                self.session.restart_search();
                self.request_focus_search = true;
            }
            Action::Exit => self.should_exit = true,
        }
    }

    fn draw_menu_bar(&mut self, ctx: &egui::Context, actions: &mut Vec<Action>) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Choose folder…").clicked() {
                        actions.push(Action::ChooseFolder);
                        ui.close();
                    }
                    if ui.button("Refresh").clicked() {
                        actions.push(Action::Refresh);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        actions.push(Action::Exit);
                        ui.close();
                    }
                });
                ui.menu_button("View", |ui| {
                    if ui.button("Filter by file patterns…").clicked() {
                        actions.push(Action::FilterPatterns);
                        ui.close();
                    }
                    if ui.button("Clear file pattern filter").clicked() {
                        actions.push(Action::ClearPatterns);
                        ui.close();
                    }
                    ui.separator();
                    if ui.checkbox(&mut self.session.show_hidden, "Show hidden files").changed() {
                        actions.push(Action::HiddenToggled);
                    }
                    if ui.button("Collapse all").clicked() {
                        actions.push(Action::CollapseAll);
                        ui.close();
                    }
                });
                ui.menu_button("Edit", |ui| {
                    let has_selection = self.session.selected.is_some();
                    if ui
                        .add_enabled(has_selection, egui::Button::new("Copy path"))
                        .clicked()
                    {
                        actions.push(Action::CopyPath);
                        ui.close();
                    }
                    if ui
                        .add_enabled(has_selection, egui::Button::new("Open in Explorer"))
                        .clicked()
                    {
                        actions.push(Action::Reveal);
                        ui.close();
                    }
                });
            });

            ui.horizontal(|ui| {
                if ui.button("Choose folder…").clicked() {
                    actions.push(Action::ChooseFolder);
                }
                let reset_width = 110.0;
                let input = egui::TextEdit::singleline(&mut self.session.query)
                    .hint_text(SEARCH_HINT)
                    .desired_width(ui.available_width() - reset_width);
                let response = ui.add(input);
                if self.request_focus_search {
                    response.request_focus();
                    self.request_focus_search = false;
                }
                self.search_has_focus = response.has_focus();
                if response.changed() {
                    self.session.selected = None;
                    self.session.restart_search();
                }
                if ui.button("Reset search").clicked() {
                    actions.push(Action::ResetSearch);
                }
            });
            ui.add_space(2.0);
        });
    }

    fn draw_status_bar(&mut self, ctx: &egui::Context) {
        let mut text = self.session.status_text();
        if let Some(active) = &self.session.search {
            text = format!(
                "{} Searching… {} found",
                SPINNER_FRAMES[self.spinner_index], active.matches
            );
        } else if self.session.is_loading() {
            text = format!("{} Loading…  {text}", SPINNER_FRAMES[self.spinner_index]);
        }
        let filter = (!self.session.patterns.is_empty()).then(|| self.session.patterns.display());

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(text);
                if let Some(filter) = filter {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.weak(format!("Filter: {filter}"));
                    });
                }
            });
        });
    }

    fn draw_tree(&mut self, ctx: &egui::Context, actions: &mut Vec<Action>) {
        let rows = self.session.tree.visible_rows(ViewOptions {
            show_hidden: self.session.show_hidden,
            patterns: (!self.session.patterns.is_empty()).then_some(&self.session.patterns),
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if rows.is_empty() {
                if self.session.tree.root().is_some_and(|r| r.is_expanded()) {
                    ui.weak("(empty)");
                }
                return;
            }

            let mut scroll = ScrollArea::both().auto_shrink([false, false]);
            if self.session.scroll_to_selected {
                if let Some(idx) = rows
                    .iter()
                    .position(|r| Some(&r.path) == self.session.selected.as_ref())
                {
                    let spacing = ui.spacing().item_spacing.y;
                    let offset = (idx as f32 * (ROW_HEIGHT + spacing) - ROW_HEIGHT * 3.0).max(0.0);
                    scroll = scroll.vertical_scroll_offset(offset);
                }
                self.session.scroll_to_selected = false;
            }

            scroll.show_rows(ui, ROW_HEIGHT, rows.len(), |ui, range| {
                for row in &rows[range] {
                    self.draw_row(ctx, ui, row, actions);
                }
            });
        });
    }

    fn draw_row(
        &mut self,
        ctx: &egui::Context,
        ui: &mut egui::Ui,
        row: &VisibleRow,
        actions: &mut Vec<Action>,
    ) {
        let is_dir = row.kind == NodeKind::Directory;
        let selected = self.session.selected.as_ref() == Some(&row.path);
        let pending = self.session.is_pending(&row.path);

        ui.horizontal(|ui| {
            ui.set_min_height(ROW_HEIGHT);
            ui.add_space(row.depth as f32 * INDENT);

            // Resolved directory links expand like folders; broken ones are files.
            if is_dir {
                let arrow = if pending {
                    "…"
                } else if row.state == filetree_core::LoadState::Expanded {
                    "▼"
                } else {
                    "▶"
                };
                if ui
                    .add_sized([INDENT, ROW_HEIGHT], egui::Button::new(arrow).frame(false))
                    .clicked()
                {
                    actions.push(Action::Toggle(row.path.clone()));
                }
            } else {
                ui.add_space(INDENT + ui.spacing().item_spacing.x);
            }

            match self.icons.icon_for(ctx, &row.path, row.kind) {
                Some(texture_id) => {
                    ui.image((texture_id, egui::vec2(ICON_SIZE, ICON_SIZE)));
                }
                None => {
                    ui.label(row_glyph(row));
                }
            }

            let mut text = RichText::new(row_label(row));
            if self.session.matches.contains(&row.path) {
                text = text.strong().color(MATCH_COLOR);
            } else if row.unresolved || row.error.is_some() {
                text = text.weak();
            }

            let resp = ui.add(egui::Button::selectable(selected, text));
            if resp.clicked() {
                actions.push(Action::Select(row.path.clone()));
            }
            if resp.double_clicked() {
                if is_dir {
                    actions.push(Action::Toggle(row.path.clone()));
                } else {
                    actions.push(Action::Select(row.path.clone()));
                    actions.push(Action::Reveal);
                }
            }
            resp.context_menu(|ui| {
                actions.push(Action::Select(row.path.clone()));
                if ui.button("Copy path").clicked() {
                    actions.push(Action::CopyPath);
                    ui.close();
                }
                if ui.button("Open in Explorer").clicked() {
                    actions.push(Action::Reveal);
                    ui.close();
                }
                ui.separator();
                if ui.button("Refresh").clicked() {
                    actions.push(Action::Refresh);
                    ui.close();
                }
                if ui.button("Choose folder…").clicked() {
                    actions.push(Action::ChooseFolder);
                    ui.close();
                }
            });
        });
    }

    fn draw_folder_prompt(&mut self, ctx: &egui::Context) {
        let Some(mut input) = self.folder_prompt.take() else {
            return;
        };
        let mut open = true;
        let mut cancelled = false;
        let mut chosen = None;
        egui::Window::new("Choose folder")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(FOLDER_PROMPT_NOTE);
                let response = ui.add(
                    egui::TextEdit::singleline(&mut input)
                        .desired_width(420.0)
                        .hint_text("Folder path"),
                );
                response.request_focus();
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
                ui.horizontal(|ui| {
                    if ui.button("Open").clicked() || submitted {
                        chosen = Some(folder_from_input(&input));
                    }
                    if ui.button("Cancel").clicked() {
                        cancelled = true;
                    }
                });
            });

        match chosen {
            Some(Some(folder)) => self.session.set_root(&folder),
            Some(None) => {}
            None if open && !cancelled => self.folder_prompt = Some(input),
            None => {}
        }
    }

    fn draw_pattern_prompt(&mut self, ctx: &egui::Context) {
        let Some(mut input) = self.pattern_prompt.take() else {
            return;
        };
        let mut open = true;
        let mut cancelled = false;
        let mut accepted = false;
        egui::Window::new("Filter by file patterns")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Show only files matching these patterns (separate with ';'):");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut input)
                        .desired_width(420.0)
                        .hint_text(PATTERN_HINT),
                );
                response.request_focus();
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() || submitted {
                        accepted = true;
                    }
                    if ui.button("Cancel").clicked() {
                        cancelled = true;
                    }
                });
            });

        if accepted {
            self.session.apply_patterns(&input);
        } else if open && !cancelled {
            self.pattern_prompt = Some(input);
        }
    }
}

impl eframe::App for FileTreeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.handle_worker_events();
        self.tick_spinner();

        let mut actions = if self.folder_prompt.is_none() && self.pattern_prompt.is_none() {
            self.handle_keyboard(ctx)
        } else {
            Vec::new()
        };

        self.draw_menu_bar(ctx, &mut actions);
        self.draw_status_bar(ctx);
        self.draw_tree(ctx, &mut actions);
        self.draw_folder_prompt(ctx);
        self.draw_pattern_prompt(ctx);

        for action in actions {
            self.apply(action);
        }

        if self.should_exit {
            self.session.cancel_search();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        if self.session.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(80));
        } else if let Some(at) = self.session.status.as_ref().and_then(|s| s.expires) {
            ctx.request_repaint_after(at.saturating_duration_since(Instant::now()));
        }
    }
}

impl Drop for FileTreeApp {
    fn drop(&mut self) {
        self.session.cancel_search();
    }
}

/// Folder typed into the prompt. Surrounding whitespace and the quotes a
/// file manager adds when copying a path are dropped.
fn folder_from_input(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();
    (!unquoted.is_empty()).then(|| PathBuf::from(unquoted))
}

fn row_label(row: &VisibleRow) -> String {
    if row.unresolved {
        return format!("{}  [broken link]", row.name);
    }
    match &row.error {
        Some(err) => format!("{}  [{}]", row.name, err.annotation()),
        None => row.name.clone(),
    }
}

fn row_glyph(row: &VisibleRow) -> &'static str {
    if row.unresolved {
        "⚠"
    } else if row.is_link {
        "🔗"
    } else if row.kind == NodeKind::Directory {
        "📁"
    } else {
        "📄"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetree_core::TreeError;

    fn row(name: &str, kind: NodeKind) -> VisibleRow {
        VisibleRow {
            path: PathBuf::from("/r").join(name),
            name: name.to_string(),
            depth: 0,
            kind,
            state: filetree_core::LoadState::Unloaded,
            is_link: false,
            unresolved: false,
            error: None,
        }
    }

    #[test]
    fn plain_rows_show_their_name() {
        assert_eq!(row_label(&row("main.rs", NodeKind::File)), "main.rs");
        assert_eq!(row_glyph(&row("src", NodeKind::Directory)), "📁");
    }

    #[test]
    fn failed_directory_is_annotated() {
        let mut locked = row("secret", NodeKind::Directory);
        locked.error = Some(TreeError::AccessDenied(PathBuf::from("/r/secret")));
        assert_eq!(row_label(&locked), "secret  [locked]");
    }

    #[test]
    fn folder_prompt_accepts_typed_and_pasted_paths() {
        assert_eq!(folder_from_input("  /work/src \n"), Some(PathBuf::from("/work/src")));
        assert_eq!(
            folder_from_input("\"C:\\Users\\me\\My Files\""),
            Some(PathBuf::from("C:\\Users\\me\\My Files"))
        );
        assert_eq!(folder_from_input("   "), None);
        assert_eq!(folder_from_input("\"\""), None);
    }

    #[test]
    fn directory_link_row_shows_link_glyph() {
        let mut alias = row("alias", NodeKind::Directory);
        alias.is_link = true;
        assert_eq!(row_glyph(&alias), "🔗");
        assert_eq!(row_label(&alias), "alias");
    }

    #[test]
    fn broken_link_is_flagged() {
        let mut broken = row("gone", NodeKind::File);
        broken.is_link = true;
        broken.unresolved = true;
        assert_eq!(row_label(&broken), "gone  [broken link]");
        assert_eq!(row_glyph(&broken), "⚠");
    }
}
