//! App shell (`SPEC_FULL.md` §5, §9): wires `Model`, one or more `Protocol`
//! backends, and a `Cache` together behind a single `tokio::select!` event
//! loop, generalizing the REPL's terminal-setup/event-loop pattern to a
//! chat client with an arbitrary number of logged-in backends instead of
//! one LLM stream.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use nchat_core::{
    Cache, Config, FeatureSet, FileInfo, FileStatus, ProfileId, ProfileService, Protocol, ProtocolFeature, Request,
};

use crate::dialog::{read_dir_entries, ConfirmDialog, ContactItem, ContactListDialog, EmojiListDialog, FileListDialog, FileListOutcome};
use crate::external;
use crate::model::{ChatKey, Effect, Key, Model, Mode, OutgoingRequest};
use crate::view::{self, DialogRow, DialogView};

/// Schema version every backend's cache store is opened at. Bumping this
/// would need a migration path in `nchat_core::cache`; there is only one
/// schema so far.
const CACHE_DB_VERSION: u32 = 1;

/// Row count list dialogs use for `PageUp`/`PageDown` jumps. The terminal's
/// actual popup height varies with the frame, but a fixed page size keeps
/// dialog key handling independent of the render pass.
const DIALOG_PAGE_SIZE: usize = 10;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Restores terminal state on drop, the same discipline the REPL's own
/// `TerminalGuard` uses: raw mode and the alternate screen are undone
/// whether the loop exits cleanly, on error, or via a panic.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(io::stdout(), EnterAlternateScreen).context("failed to enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

type BackendHandle = Arc<AsyncMutex<Box<dyn Protocol>>>;

/// What `crate::app` currently has modal focus, outside `Model`'s own key
/// state machine. `Esc`/`Quit` close any of these without a result, matching
/// every dialog's `handle_key`.
enum ActiveDialog {
    Confirm { dialog: ConfirmDialog, on_confirm: ConfirmAction },
    Contacts(ContactListDialog),
    Emoji { dialog: EmojiListDialog, chat_key: ChatKey, msg_id: nchat_core::MsgId },
    Files { dialog: FileListDialog, chat_key: ChatKey },
}

enum ConfirmAction {
    Quit,
}

impl ActiveDialog {
    fn handle_key(&mut self, key: Key) {
        match self {
            ActiveDialog::Confirm { dialog, .. } => dialog.handle_key(key),
            ActiveDialog::Contacts(dialog) => dialog.handle_key(key, DIALOG_PAGE_SIZE),
            ActiveDialog::Emoji { dialog, .. } => dialog.handle_key(key, DIALOG_PAGE_SIZE),
            ActiveDialog::Files { dialog, .. } => dialog.handle_key(key, DIALOG_PAGE_SIZE),
        }
    }

    /// `FileListDialog::is_running` also reports `false` on `Left`/`Up`
    /// navigation, not only on a terminal result, so `crate::app`'s generic
    /// "resolve once not running" dispatch cannot be reused for it — the
    /// `handle_key` free function special-cases `ActiveDialog::Files` before
    /// ever consulting this method.
    fn is_running(&self) -> bool {
        match self {
            ActiveDialog::Confirm { dialog, .. } => dialog.is_running(),
            ActiveDialog::Contacts(dialog) => dialog.is_running(),
            ActiveDialog::Emoji { dialog, .. } => dialog.is_running(),
            ActiveDialog::Files { dialog, .. } => dialog.is_running(),
        }
    }

    fn as_view(&self) -> DialogView<'_> {
        match self {
            ActiveDialog::Confirm { dialog, .. } => DialogView::Message { message: dialog.message() },
            ActiveDialog::Contacts(dialog) => DialogView::List {
                title: "Contacts",
                rows: dialog.visible().iter().map(|(display, _)| DialogRow { display, shaded: false }).collect(),
                selected_index: dialog.selected_index(),
                filter: "",
            },
            ActiveDialog::Emoji { dialog, .. } => DialogView::List {
                title: "Reactions",
                rows: dialog.visible().iter().map(|(display, _)| DialogRow { display, shaded: false }).collect(),
                selected_index: dialog.selected_index(),
                filter: "",
            },
            ActiveDialog::Files { dialog, .. } => DialogView::List {
                title: "Files",
                rows: dialog.visible().iter().map(|(display, _)| DialogRow { display, shaded: false }).collect(),
                selected_index: dialog.selected_index(),
                filter: "",
            },
        }
    }
}

/// Every `ProtocolFeature` the core knows about; `Protocol` only exposes a
/// per-feature query, so the full set a backend advertises is reconstructed
/// by probing each flag once at registration time.
fn features_of(backend: &dyn Protocol) -> FeatureSet {
    [
        ProtocolFeature::AutoGetChatsOnLogin,
        ProtocolFeature::TypingTimeout,
        ProtocolFeature::EditWithinTwoDays,
        ProtocolFeature::EditWithinFifteenMins,
        ProtocolFeature::LimitedReactions,
        ProtocolFeature::MarkReadEveryView,
        ProtocolFeature::AutoGetContactsOnLogin,
    ]
    .into_iter()
    .filter(|f| backend.has_feature(*f))
    .collect()
}

/// Runs the terminal UI until the user confirms quitting or a fatal error
/// occurs. Takes ownership of every backend for the session's lifetime: each
/// is opened against `cache`, logged in, and logged out on the way out.
pub async fn run(config: Config, cache: Arc<dyn Cache>, backends: Vec<Box<dyn Protocol>>) -> Result<()> {
    let external = config.external.clone();
    let model = Arc::new(Model::new(config));
    let (service_tx, mut service_rx) = mpsc::unbounded_channel::<ProfileService>();
    let mut handles: HashMap<ProfileId, BackendHandle> = HashMap::new();

    for mut backend in backends {
        let profile_id = ProfileId::new(backend.profile_id());
        cache.add_profile(&profile_id, CACHE_DB_VERSION).await.context("failed to open profile cache")?;

        let features = features_of(backend.as_ref());
        model.register_profile(profile_id.clone(), backend.self_id(), features);

        let tx = service_tx.clone();
        backend.set_message_handler(Arc::new(move |msg: ProfileService| {
            let _ = tx.send(msg);
        }));
        backend.login().await.context("backend login failed")?;

        handles.insert(profile_id, Arc::new(AsyncMutex::new(backend)));
    }
    drop(service_tx);

    let _guard = TerminalGuard::new()?;
    let mut terminal = ratatui::init();
    let mut events = EventStream::new();
    let mut active_dialog: Option<ActiveDialog> = None;
    let mut status_message = String::new();

    while model.is_running() {
        // While a backend owns `ProtocolUiControl`, the screen stays torn
        // down and keys are dropped unread (`HandleProtocolUiControlStart`'s
        // `endwin()`), matching `model::takeover`'s suspend discipline.
        let takeover_active = model.takeover_active();
        if !takeover_active {
            terminal
                .draw(|frame| {
                    let snapshot = model.snapshot();
                    let dialog_view = active_dialog.as_ref().map(ActiveDialog::as_view);
                    view::render_ui(frame, &snapshot, &status_message, dialog_view.as_ref());
                })
                .context("failed to draw UI")?;
        }

        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if takeover_active {
                            // Discarded, per `HandleProtocolUiControlEnd`'s
                            // "drain any input queued during the takeover".
                            continue;
                        }
                        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                            break;
                        }
                        handle_key(key, &model, &cache, &handles, &external, &mut active_dialog, &mut status_message)
                            .await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => status_message = format!("terminal event error: {e}"),
                    None => break,
                }
            }
            msg = service_rx.recv() => {
                match msg {
                    Some(msg) => {
                        let effects = model.apply_service(msg, now_ms());
                        run_effects(&cache, &handles, effects, &mut status_message).await;
                    }
                    None => {}
                }
            }
        }
    }

    for backend in handles.values() {
        backend.lock().await.logout().await;
    }
    drop(_guard);
    ratatui::restore();

    Ok(())
}

async fn handle_key(
    key: KeyEvent,
    model: &Arc<Model>,
    cache: &Arc<dyn Cache>,
    handles: &HashMap<ProfileId, BackendHandle>,
    programs: &nchat_core::ExternalConfig,
    active_dialog: &mut Option<ActiveDialog>,
    status_message: &mut String,
) {
    if let Some(dialog) = active_dialog {
        if let Some(mapped) = map_key(key.code) {
            dialog.handle_key(mapped);
        }
        if matches!(dialog, ActiveDialog::Files { .. }) {
            handle_files_dialog(active_dialog, model, cache, handles, status_message).await;
            return;
        }
        if !dialog.is_running() {
            let finished = active_dialog.take().expect("checked Some above");
            resolve_dialog(finished, model, handles).await;
        }
        return;
    }

    // `Ctrl+Q` is the configurable quit binding (`key.conf`'s `KeyQuit`),
    // gated behind a confirmation the way `uimessagedialog.cpp`'s "Quit
    // nchat?" prompt does; plain `q` still types into the entry box.
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('q') {
        *active_dialog =
            Some(ActiveDialog::Confirm { dialog: ConfirmDialog::new("Quit nchat?"), on_confirm: ConfirmAction::Quit });
        return;
    }

    match key.code {
        KeyCode::F(1) => {
            if let Some(dialog) = open_contacts_dialog(model) {
                *active_dialog = Some(dialog);
            }
        }
        KeyCode::F(3) => {
            if let Some(dialog) = open_emoji_dialog(model) {
                *active_dialog = Some(dialog);
            }
        }
        KeyCode::F(4) => {
            open_selected_target(model, programs, status_message).await;
        }
        KeyCode::F(5) => {
            match open_files_dialog(model) {
                Ok(Some(dialog)) => *active_dialog = Some(dialog),
                Ok(None) => {}
                Err(e) => *status_message = format!("failed to list directory: {e}"),
            }
        }
        _ => {
            if let Some(mapped) = map_key(key.code) {
                let effects = model.handle_key(mapped, now_ms());
                run_effects(cache, handles, effects, status_message).await;
            }
        }
    }
}

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Backspace => Some(Key::Backspace),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Esc => Some(Key::Esc),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Left => Some(Key::Left),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Home => Some(Key::Home),
        KeyCode::End => Some(Key::End),
        KeyCode::PageUp => Some(Key::PageUp),
        KeyCode::PageDown => Some(Key::PageDown),
        KeyCode::F(2) => Some(Key::EditSelected),
        _ => None,
    }
}

fn open_contacts_dialog(model: &Model) -> Option<ActiveDialog> {
    let snapshot = model.snapshot();
    let mut contacts: Vec<(String, ContactItem)> = snapshot
        .contact_infos
        .iter()
        .filter(|(_, info)| !info.is_self)
        .map(|((profile_id, user_id), info)| {
            let display = if info.name.is_empty() { user_id.as_str().to_string() } else { info.name.clone() };
            (display, ContactItem { profile_id: profile_id.clone(), user_id: user_id.clone() })
        })
        .collect();
    contacts.sort_by(|a, b| a.0.cmp(&b.0));
    if contacts.is_empty() {
        return None;
    }
    Some(ActiveDialog::Contacts(ContactListDialog::new(contacts)))
}

fn open_emoji_dialog(model: &Model) -> Option<ActiveDialog> {
    let snapshot = model.snapshot();
    if snapshot.mode != Mode::SelectMessage {
        return None;
    }
    let chat_key = snapshot.current_chat.clone()?;
    let index = snapshot.selected_index?;
    let message = snapshot.visible_messages.get(&chat_key)?.get(index)?;
    let emojis = snapshot.available_reactions.get(&chat_key).cloned().unwrap_or_default();
    if emojis.is_empty() {
        return None;
    }
    Some(ActiveDialog::Emoji { dialog: EmojiListDialog::new(emojis), chat_key, msg_id: message.id.clone() })
}

/// `F5` opens an attachment picker rooted at the user's home directory
/// (`uimodel.cpp`'s file-transfer dialog); requires a chat on screen to send
/// into, same precondition as the entry box.
fn open_files_dialog(model: &Model) -> Result<Option<ActiveDialog>, std::io::Error> {
    let snapshot = model.snapshot();
    let Some(chat_key) = snapshot.current_chat.clone() else { return Ok(None) };
    let start_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    let entries = match read_dir_entries(&start_dir) {
        Ok(entries) => entries,
        Err(e) => return Err(std::io::Error::other(e.to_string())),
    };
    Ok(Some(ActiveDialog::Files { dialog: FileListDialog::new(start_dir, entries), chat_key }))
}

/// Drives `FileListDialog` past the generic dialog dispatch: unlike
/// `Confirm`/`Contacts`/`Emoji`, a `Left`/directory-`Enter` keypress reports
/// `is_running() == false` without the dialog actually being done, so every
/// keypress is resolved through [`crate::dialog::FileListDialog::take_outcome`]
/// instead of only the first one after it stops running.
async fn handle_files_dialog(
    active_dialog: &mut Option<ActiveDialog>,
    model: &Arc<Model>,
    cache: &Arc<dyn Cache>,
    handles: &HashMap<ProfileId, BackendHandle>,
    status_message: &mut String,
) {
    let outcome = match active_dialog {
        Some(ActiveDialog::Files { dialog, .. }) => dialog.take_outcome(),
        _ => return,
    };

    match outcome {
        FileListOutcome::Pending => {}
        FileListOutcome::NavigateInto(path) => reload_file_dialog(active_dialog, path, status_message),
        FileListOutcome::Up => {
            let parent = match active_dialog {
                Some(ActiveDialog::Files { dialog, .. }) => dialog.current_dir().parent().map(Path::to_path_buf),
                _ => None,
            };
            match parent {
                Some(parent) => reload_file_dialog(active_dialog, parent, status_message),
                None => *active_dialog = None,
            }
        }
        FileListOutcome::Selected(path) => {
            let chat_key = match active_dialog {
                Some(ActiveDialog::Files { chat_key, .. }) => chat_key.clone(),
                _ => return,
            };
            *active_dialog = None;
            let file_path = path.to_string_lossy().into_owned();
            let file_type = path.extension().map(|ext| ext.to_string_lossy().into_owned()).unwrap_or_default();
            let effects = model.send_attachment(chat_key, file_path, file_type, now_ms());
            run_effects(cache, handles, effects, status_message).await;
        }
        FileListOutcome::Cancelled => *active_dialog = None,
    }
}

/// Re-lists `dir` in place for `Up`/`NavigateInto`, or falls back to closing
/// the dialog with a status message if the directory cannot be read (e.g.
/// permission denied descending into it).
fn reload_file_dialog(active_dialog: &mut Option<ActiveDialog>, dir: PathBuf, status_message: &mut String) {
    match read_dir_entries(&dir) {
        Ok(entries) => {
            if let Some(ActiveDialog::Files { dialog, .. }) = active_dialog {
                dialog.set_entries(dir, entries);
            }
        }
        Err(e) => {
            *status_message = format!("failed to list directory: {e}");
            *active_dialog = None;
        }
    }
}

/// `F4` on a selected message opens its link or its downloaded attachment
/// in an external program (`SPEC_FULL.md` §4.5): a link takes priority,
/// matching the original `uiview.cpp`'s "open link, else attachment"
/// ordering. Nothing happens if neither is present or the file hasn't
/// downloaded yet.
async fn open_selected_target(model: &Model, programs: &nchat_core::ExternalConfig, status_message: &mut String) {
    let snapshot = model.snapshot();
    let Some(chat_key) = snapshot.current_chat.clone() else { return };
    let Some(index) = snapshot.selected_index else { return };
    let Some(message) = snapshot.visible_messages.get(&chat_key).and_then(|msgs| msgs.get(index)) else { return };

    if let Some(link) = message.link.clone() {
        if let Err(e) = external::run_external(&programs.link_command, &link).await {
            *status_message = format!("failed to open link: {e}");
        }
        return;
    }

    let Some(file_info) = message.file_info.as_deref().and_then(|hex| FileInfo::from_hex(hex).ok()) else { return };
    if file_info.file_status != FileStatus::Downloaded {
        *status_message = "attachment not downloaded yet".to_string();
        return;
    }
    if let Err(e) = external::run_external(&programs.attachment_command, &file_info.file_path).await {
        *status_message = format!("failed to open attachment: {e}");
    }
}

async fn resolve_dialog(mut dialog: ActiveDialog, model: &Arc<Model>, handles: &HashMap<ProfileId, BackendHandle>) {
    match &mut dialog {
        ActiveDialog::Confirm { dialog, on_confirm } => {
            if dialog.result() {
                match on_confirm {
                    ConfirmAction::Quit => {
                        model.handle_key(Key::Quit, now_ms());
                    }
                }
            }
        }
        ActiveDialog::Contacts(list) => {
            if let Some(item) = list.take_result() {
                if let Some(backend) = handles.get(&item.profile_id) {
                    backend.lock().await.send_request(Request::CreateChat { user_id: item.user_id }).await;
                }
            }
        }
        ActiveDialog::Emoji { dialog, chat_key, msg_id } => {
            if let Some(emoji) = dialog.take_result() {
                if let Some(backend) = handles.get(&chat_key.0) {
                    backend
                        .lock()
                        .await
                        .send_request(Request::SendReaction { chat_id: chat_key.1.clone(), msg_id: msg_id.clone(), emoji })
                        .await;
                }
            }
        }
        // `Files` never reaches here: `handle_files_dialog` intercepts it
        // every keypress and resolves `Selected`/`Cancelled` itself.
        ActiveDialog::Files { .. } => {}
    }
}

async fn run_effects(
    cache: &Arc<dyn Cache>,
    handles: &HashMap<ProfileId, BackendHandle>,
    effects: Vec<Effect>,
    status_message: &mut String,
) {
    for effect in effects {
        match effect {
            Effect::Send(OutgoingRequest { profile_id, request }) => {
                if let Some(backend) = handles.get(&profile_id) {
                    backend.lock().await.send_request(request).await;
                }
            }
            Effect::PersistMessages { profile_id, chat_id, messages } => {
                if let Err(e) = cache.add_messages(&profile_id, &chat_id, &messages).await {
                    *status_message = format!("cache error: {e}");
                }
            }
            Effect::PersistMessage { profile_id, chat_id, message } => {
                if let Err(e) = cache.update_message(&profile_id, &chat_id, &message).await {
                    *status_message = format!("cache error: {e}");
                }
            }
            Effect::DeleteMessage { profile_id, chat_id, msg_id } => {
                if let Err(e) = cache.delete_message(&profile_id, &chat_id, &msg_id).await {
                    *status_message = format!("cache error: {e}");
                }
            }
            Effect::MergeReactions { profile_id, chat_id, msg_id, reactions } => {
                if let Err(e) = cache.merge_reactions(&profile_id, &chat_id, &msg_id, &reactions).await {
                    *status_message = format!("cache error: {e}");
                }
            }
            Effect::DesktopNotify { chat_id, text } => {
                tracing::info!(chat = chat_id.as_str(), %text, "desktop notification");
            }
            Effect::TerminalBell => {
                print!("\x07");
            }
            Effect::Exit => {}
        }
    }
}
