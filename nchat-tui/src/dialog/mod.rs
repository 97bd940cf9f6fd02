//! Dialog subsystem (`SPEC_FULL.md` §4.4): small modal state machines that
//! run on top of, but independent from, `crate::model::Model`'s own
//! `handle_key`. Each dialog is `Init → Input → Result`: constructed with a
//! snapshot of the items it offers, fed key events one at a time, and
//! queried for a result once it stops running. None of them hold the Model
//! mutex while reading keys — callers take a [`crate::model::ChatSnapshot`]
//! or a plain `Vec` up front and pass it in.

use std::path::{Path, PathBuf};

use thiserror::Error;

use nchat_core::{ProfileId, UserId};

use crate::model::Key;

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("failed to list directory '{path}': {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Case-insensitive substring match, the filter discipline every list dialog
/// applies to its display text (`uilistdialog.cpp`'s `m_FilterStr`).
fn matches_filter(display: &str, filter: &str) -> bool {
    filter.is_empty() || display.to_lowercase().contains(&filter.to_lowercase())
}

/// Generic `Init → Input → Result` list picker, parameterised over the value
/// each row carries. `shade_hidden` rows (display text starting with `.`)
/// are rendered dimmed by `crate::view` but are otherwise ordinary entries.
pub struct ListDialog<T: Clone> {
    title: &'static str,
    pub shade_hidden: bool,
    items: Vec<(String, T)>,
    filter: String,
    index: usize,
    running: bool,
    result: Option<T>,
}

impl<T: Clone> ListDialog<T> {
    pub fn new(title: &'static str, shade_hidden: bool) -> Self {
        Self { title, shade_hidden, items: Vec::new(), filter: String::new(), index: 0, running: true, result: None }
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    /// Replaces the full item set, matching `OnTimer`'s re-filter-on-refresh
    /// behavior when the Model's backing data changes mid-dialog.
    pub fn set_items(&mut self, items: Vec<(String, T)>) {
        self.items = items;
        self.clamp_index();
    }

    pub fn filter_text(&self) -> &str {
        &self.filter
    }

    pub fn selected_index(&self) -> usize {
        self.index
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn take_result(&mut self) -> Option<T> {
        self.result.take()
    }

    /// Rows currently passing the filter, in original order.
    pub fn visible(&self) -> Vec<&(String, T)> {
        self.items.iter().filter(|(display, _)| matches_filter(display, &self.filter)).collect()
    }

    fn clamp_index(&mut self) {
        let len = self.visible().len();
        self.index = if len == 0 { 0 } else { self.index.min(len - 1) };
    }

    fn move_index(&mut self, delta: isize) {
        let len = self.visible().len() as isize;
        if len == 0 {
            return;
        }
        let next = (self.index as isize).saturating_add(delta).clamp(0, len - 1);
        self.index = next as usize;
    }

    /// Cancels without a result, as if `cancel`/`quit` had been pressed.
    pub fn close(&mut self) {
        self.running = false;
        self.result = None;
    }

    fn select(&mut self) {
        if let Some((_, value)) = self.visible().get(self.index) {
            self.result = Some((*value).clone());
        }
        self.running = false;
    }

    /// `page_size` is the dialog's visible row count (its `m_H`), used for
    /// `PageUp`/`PageDown` jumps.
    pub fn handle_key(&mut self, key: Key, page_size: usize) {
        match key {
            Key::Esc | Key::Quit | Key::Left => self.close(),
            Key::Right | Key::Enter => self.select(),
            Key::Up => self.move_index(-1),
            Key::Down => self.move_index(1),
            Key::PageUp => self.move_index(-(page_size as isize)),
            Key::PageDown => self.move_index(page_size as isize),
            Key::Home => self.index = 0,
            Key::End => self.move_index(isize::MAX),
            Key::Backspace => {
                self.filter.pop();
                self.clamp_index();
            }
            Key::Char(c) => {
                self.filter.push(c);
                self.clamp_index();
            }
            Key::EditSelected => {}
        }
    }
}

/// Read-only text popup, shared by help text (`MessageDialog`) and yes/no
/// prompts (`ConfirmDialog`): `Enter` confirms, `Esc`/`Quit` cancels.
pub struct MessageDialog {
    message: String,
    running: bool,
    result: bool,
}

impl MessageDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), running: true, result: false }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `true` once `Enter` closed the dialog, `false` on cancel. Only
    /// meaningful after `is_running()` returns `false`.
    pub fn result(&self) -> bool {
        self.result
    }

    pub fn handle_key(&mut self, key: Key) {
        match key {
            Key::Enter => {
                self.result = true;
                self.running = false;
            }
            Key::Esc | Key::Quit => {
                self.result = false;
                self.running = false;
            }
            _ => {}
        }
    }
}

/// A yes/no prompt is a [`MessageDialog`] read for its boolean result rather
/// than dismissed as an acknowledgement.
pub type ConfirmDialog = MessageDialog;

/// One contact entry, profile-qualified since multiple backends may share a
/// dialog session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactItem {
    pub profile_id: ProfileId,
    pub user_id: UserId,
}

pub struct ContactListDialog {
    list: ListDialog<ContactItem>,
}

impl ContactListDialog {
    /// `contacts` pairs a display name with the profile/user it resolves to,
    /// taken from the Model's `contact_infos` under a brief lock
    /// (`uicontactlistdialog.cpp::UpdateList`).
    pub fn new(contacts: Vec<(String, ContactItem)>) -> Self {
        let mut list = ListDialog::new("Contacts", false);
        list.set_items(contacts);
        Self { list }
    }

    pub fn handle_key(&mut self, key: Key, page_size: usize) {
        self.list.handle_key(key, page_size);
    }

    pub fn is_running(&self) -> bool {
        self.list.is_running()
    }

    pub fn take_result(&mut self) -> Option<ContactItem> {
        self.list.take_result()
    }

    pub fn visible(&self) -> Vec<&(String, ContactItem)> {
        self.list.visible()
    }

    pub fn selected_index(&self) -> usize {
        self.list.selected_index()
    }
}

pub struct EmojiListDialog {
    list: ListDialog<String>,
}

impl EmojiListDialog {
    /// `emojis` is the set carried on `ModelState::available_reactions` for
    /// the chat the reaction is being added to.
    pub fn new(emojis: Vec<String>) -> Self {
        let mut list = ListDialog::new("Reactions", false);
        let items = emojis.into_iter().map(|e| (e.clone(), e)).collect();
        list.set_items(items);
        Self { list }
    }

    pub fn handle_key(&mut self, key: Key, page_size: usize) {
        self.list.handle_key(key, page_size);
    }

    pub fn is_running(&self) -> bool {
        self.list.is_running()
    }

    pub fn take_result(&mut self) -> Option<String> {
        self.list.take_result()
    }

    pub fn visible(&self) -> Vec<&(String, String)> {
        self.list.visible()
    }

    pub fn selected_index(&self) -> usize {
        self.list.selected_index()
    }
}

/// A single row of a [`FileListDialog`]'s current directory listing.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// What a completed or navigating [`FileListDialog`] key press produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListOutcome {
    Pending,
    /// `Right`/`Enter` on a directory row: caller re-lists and calls
    /// [`FileListDialog::set_entries`] with the new directory's contents.
    NavigateInto(PathBuf),
    /// `Right`/`Enter` on a regular file: the dialog's result.
    Selected(PathBuf),
    /// `Left`: caller re-lists the parent directory.
    Up,
    Cancelled,
}

/// File/attachment picker, grounded on `uifilelistdialog.cpp`: `Left`
/// ascends a directory, `Right`/`Enter` descends into one or selects a file.
pub struct FileListDialog {
    current_dir: PathBuf,
    list: ListDialog<FileEntry>,
    went_up: bool,
}

impl FileListDialog {
    pub fn new(current_dir: PathBuf, entries: Vec<FileEntry>) -> Self {
        let mut dialog = Self { current_dir: current_dir.clone(), list: ListDialog::new("Files", true), went_up: false };
        dialog.set_entries(current_dir, entries);
        dialog
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Loads a freshly-read directory listing, dot-prefixing hidden entries
    /// so `shade_hidden` dims them (`uifilelistdialog.cpp`'s hidden-file
    /// convention).
    pub fn set_entries(&mut self, dir: PathBuf, entries: Vec<FileEntry>) {
        self.current_dir = dir;
        let items = entries
            .into_iter()
            .map(|entry| {
                let name = entry.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                let display = if entry.is_dir { format!("{name}/") } else { name };
                (display, entry)
            })
            .collect();
        self.list.set_items(items);
    }

    pub fn handle_key(&mut self, key: Key, page_size: usize) {
        if key == Key::Left {
            self.went_up = true;
            self.list.close();
            return;
        }
        self.list.handle_key(key, page_size);
    }

    pub fn is_running(&self) -> bool {
        self.list.is_running() && !self.went_up
    }

    pub fn take_outcome(&mut self) -> FileListOutcome {
        if self.went_up {
            self.went_up = false;
            return FileListOutcome::Up;
        }
        if let Some(entry) = self.list.take_result() {
            return if entry.is_dir { FileListOutcome::NavigateInto(entry.path) } else { FileListOutcome::Selected(entry.path) };
        }
        if !self.list.is_running() {
            return FileListOutcome::Cancelled;
        }
        FileListOutcome::Pending
    }

    pub fn visible(&self) -> Vec<&(String, FileEntry)> {
        self.list.visible()
    }

    pub fn selected_index(&self) -> usize {
        self.list.selected_index()
    }
}

/// Reads `dir`'s entries into [`FileEntry`] rows, directories first then
/// files, both alphabetical — the listing a `FileListDialog` displays.
pub fn read_dir_entries(dir: &Path) -> Result<Vec<FileEntry>, DialogError> {
    let read = std::fs::read_dir(dir).map_err(|source| DialogError::ListDir { path: dir.to_path_buf(), source })?;
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| DialogError::ListDir { path: dir.to_path_buf(), source })?;
        let file_type = entry.file_type().map_err(|source| DialogError::ListDir { path: dir.to_path_buf(), source })?;
        entries.push(FileEntry { path: entry.path(), is_dir: file_type.is_dir() });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.path.cmp(&b.path)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<(String, &'static str)> {
        vec![("alpha".into(), "alpha"), ("beta".into(), "beta"), ("gamma".into(), "gamma")]
    }

    #[test]
    fn enter_selects_highlighted_item() {
        let mut dialog = ListDialog::new("t", false);
        dialog.set_items(items());
        dialog.handle_key(Key::Down, 10);
        dialog.handle_key(Key::Enter, 10);
        assert!(!dialog.is_running());
        assert_eq!(dialog.take_result(), Some("beta"));
    }

    #[test]
    fn esc_cancels_without_result() {
        let mut dialog = ListDialog::new("t", false);
        dialog.set_items(items());
        dialog.handle_key(Key::Esc, 10);
        assert!(!dialog.is_running());
        assert_eq!(dialog.take_result(), None);
    }

    #[test]
    fn typing_filters_items_and_resets_index() {
        let mut dialog = ListDialog::new("t", false);
        dialog.set_items(items());
        dialog.handle_key(Key::Down, 10);
        dialog.handle_key(Key::Char('g'), 10);
        assert_eq!(dialog.visible().len(), 1);
        assert_eq!(dialog.selected_index(), 0);
        dialog.handle_key(Key::Enter, 10);
        assert_eq!(dialog.take_result(), Some("gamma"));
    }

    #[test]
    fn backspace_widens_filter_back_out() {
        let mut dialog = ListDialog::new("t", false);
        dialog.set_items(items());
        dialog.handle_key(Key::Char('a'), 10);
        assert_eq!(dialog.visible().len(), 2); // alpha, gamma
        dialog.handle_key(Key::Backspace, 10);
        assert_eq!(dialog.visible().len(), 3);
    }

    #[test]
    fn navigation_does_not_run_past_bounds() {
        let mut dialog = ListDialog::new("t", false);
        dialog.set_items(items());
        dialog.handle_key(Key::Up, 10);
        assert_eq!(dialog.selected_index(), 0);
        dialog.handle_key(Key::End, 10);
        assert_eq!(dialog.selected_index(), 2);
        dialog.handle_key(Key::Down, 10);
        assert_eq!(dialog.selected_index(), 2);
    }

    #[test]
    fn message_dialog_enter_confirms_esc_cancels() {
        let mut confirm = MessageDialog::new("Quit nchat?");
        confirm.handle_key(Key::Enter);
        assert!(!confirm.is_running());
        assert!(confirm.result());

        let mut cancel = MessageDialog::new("Quit nchat?");
        cancel.handle_key(Key::Esc);
        assert!(!cancel.is_running());
        assert!(!cancel.result());
    }

    #[test]
    fn file_list_left_reports_up_without_consuming_result() {
        let entries = vec![FileEntry { path: PathBuf::from("/tmp/a.txt"), is_dir: false }];
        let mut dialog = FileListDialog::new(PathBuf::from("/tmp"), entries);
        dialog.handle_key(Key::Left, 10);
        assert_eq!(dialog.take_outcome(), FileListOutcome::Up);
    }

    #[test]
    fn file_list_enter_on_directory_navigates_in() {
        let entries = vec![FileEntry { path: PathBuf::from("/tmp/sub"), is_dir: true }];
        let mut dialog = FileListDialog::new(PathBuf::from("/tmp"), entries);
        dialog.handle_key(Key::Enter, 10);
        assert_eq!(dialog.take_outcome(), FileListOutcome::NavigateInto(PathBuf::from("/tmp/sub")));
    }

    #[test]
    fn file_list_enter_on_file_selects_it() {
        let entries = vec![FileEntry { path: PathBuf::from("/tmp/a.txt"), is_dir: false }];
        let mut dialog = FileListDialog::new(PathBuf::from("/tmp"), entries);
        dialog.handle_key(Key::Enter, 10);
        assert_eq!(dialog.take_outcome(), FileListOutcome::Selected(PathBuf::from("/tmp/a.txt")));
    }
}
