//! docuchat application binary - composition root.
//!
//! Ties together the docuchat crates into a single terminal client:
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Build the HTTP answering backend and cloud importer
//! 3. Wire the conversation session, voice controller and upload queue to
//!    one event bus
//! 4. Run a line-oriented prompt until `/quit` or end of input

mod cli;
mod repl;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use docuchat_chat::{
    detect_language, link_voice_and_session, ChatError, ConversationSession, HttpBackend,
    ImageUpload, PromptTemplateStore, SharedLanguage, TurnOutcome, UnavailableSpeech,
    VoiceController,
};
use docuchat_core::{DocuchatConfig, EventBus, MessageId, Role, SessionEvent, UploadStatus};
use docuchat_upload::{CloudPick, HttpCloudImporter, LocalFile, UploadQueue};

use cli::CliArgs;
use repl::{parse_command, Command, HELP};

/// Everything the prompt operates on.
struct App {
    session: Arc<ConversationSession>,
    voice: Arc<VoiceController>,
    uploads: UploadQueue,
    importer: HttpCloudImporter,
    prompt: Arc<PromptTemplateStore>,
    language: SharedLanguage,
    project_id: i64,
}

/// Language from config, or from the locale when unset.
fn initial_language(configured: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    let locale = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_default();
    detect_language(&locale).to_string()
}

/// Run a turn in the background so the prompt stays responsive.
fn spawn_turn<F>(turn: F)
where
    F: std::future::Future<Output = Result<TurnOutcome, ChatError>> + Send + 'static,
{
    tokio::spawn(async move {
        match turn.await {
            Ok(TurnOutcome::Answered { .. }) => {}
            Ok(TurnOutcome::Cancelled { .. }) => println!("\n(answer cancelled)"),
            Err(e) if e.is_rejection() => println!("({})", e),
            // Transport failures are reported through TurnFailed.
            Err(e) => tracing::debug!(error = %e, "Turn ended with error"),
        }
    });
}

/// Print answers as they are revealed, plus upload milestones.
async fn render_events(
    session: Arc<ConversationSession>,
    mut rx: broadcast::Receiver<SessionEvent>,
) {
    let mut printed = 0usize;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "Renderer lagged behind events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            SessionEvent::RevealProgress { .. } => {
                if let Some(text) = session.snapshot().reveal_text {
                    let fresh: String = text.chars().skip(printed).collect();
                    printed += fresh.chars().count();
                    print!("{}", fresh);
                    flush_stdout();
                }
            }
            SessionEvent::MessageAppended {
                id,
                role: Role::Assistant,
            } => {
                if let Some(message) = session.message(id) {
                    let rest: String = message.content.chars().skip(printed).collect();
                    println!("{}", rest);
                    if let Some(ocr) = message.ocr_text.as_deref().filter(|t| !t.is_empty()) {
                        println!("  [text in image] {}", ocr);
                    }
                    for source in &message.sources {
                        println!("  [source] {}", source);
                    }
                    for (n, followup) in message.followups.iter().flatten().enumerate() {
                        println!("  [{}] {}", n + 1, followup);
                    }
                    println!("  (message {})", message.id);
                }
                printed = 0;
            }
            SessionEvent::TurnFailed { reason } => {
                printed = 0;
                println!("\n(no answer: {})", reason);
            }
            SessionEvent::UploadChanged {
                item_id, status, ..
            } if status.is_terminal() => {
                println!("(upload {} {})", item_id.short(), status);
            }
            _ => {}
        }
    }
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

fn last_followup(session: &ConversationSession, n: usize) -> Option<String> {
    session
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .and_then(|m| m.followups.as_ref())
        .and_then(|followups| followups.get(n - 1).cloned())
}

async fn read_image(path: &Path) -> std::io::Result<ImageUpload> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(ImageUpload::new(name, bytes))
}

async fn local_file(path: &Path) -> LocalFile {
    let size = tokio::fs::metadata(path).await.ok().map(|m| m.len());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    LocalFile::new(name, size)
}

/// Execute one command. Returns `false` when the prompt should exit.
async fn execute(app: &App, command: Command) -> bool {
    match command {
        Command::Empty => {}
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
        Command::Invalid(usage) => println!("usage: {}", usage),
        Command::Ask(text) => {
            let session = Arc::clone(&app.session);
            spawn_turn(async move { session.submit_question(&text).await });
        }
        Command::Send => {
            let session = Arc::clone(&app.session);
            spawn_turn(async move { session.submit_input().await });
        }
        Command::Followup(n) => match last_followup(&app.session, n) {
            Some(text) => {
                app.session.select_followup(&text);
                println!("input: {}  (/send to ask)", text);
            }
            None => println!("(no suggestion {})", n),
        },
        Command::Image(path) => match read_image(&path).await {
            Ok(image) => {
                app.session.attach_image(image);
                let session = Arc::clone(&app.session);
                spawn_turn(async move { session.submit_image().await });
            }
            Err(e) => println!("(cannot read {}: {})", path.display(), e),
        },
        Command::Upload(paths) => {
            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                files.push(local_file(path).await);
            }
            match app.uploads.admit_local_files(files) {
                Ok(ids) => {
                    for id in ids {
                        if let Some(item) = app.uploads.get(id) {
                            println!("(upload {} {})", id.short(), item.display_name);
                        }
                    }
                }
                Err(e) => println!("({})", e),
            }
        }
        Command::Url(text) => match app.uploads.admit_url(&text) {
            Ok(id) => println!("(upload {} {})", id.short(), text.trim()),
            Err(e) => println!("({})", e),
        },
        Command::Cloud {
            file_id,
            token,
            name,
        } => {
            let pick = CloudPick {
                file_id,
                display_name: name,
                auth_token: token,
            };
            match app
                .uploads
                .import_from_cloud(&app.importer, app.project_id, pick)
                .await
            {
                Ok(id) => println!("(imported {})", id.short()),
                Err(e) => println!("(cloud import failed: {})", e),
            }
        }
        Command::Remove(prefix) => match app.uploads.find_by_prefix(&prefix) {
            Some(id) => {
                app.uploads.remove_item(id);
                println!("(removed {})", id.short());
            }
            None => println!("(no single upload matches {})", prefix),
        },
        Command::Uploads => {
            let items = app.uploads.items();
            if items.is_empty() {
                println!("(no uploads)");
            }
            for item in items {
                let marker = match item.status {
                    UploadStatus::Error => item.error.unwrap_or_default(),
                    _ => format!("{:>3}%", item.progress_percent),
                };
                println!(
                    "{}  {:<9} {}  {}",
                    item.id.short(),
                    item.status,
                    marker,
                    item.display_name
                );
            }
        }
        Command::Template(text) => {
            app.prompt.set_template(text);
            if app.prompt.is_custom() {
                println!("(custom prompt template set)");
            } else {
                println!("(default prompt template restored)");
            }
        }
        Command::Lang(code) => match app.language.set(&code) {
            Ok(()) => println!("(language {})", code),
            Err(e) => println!("({})", e),
        },
        Command::Listen => match app.voice.start_or_stop_listening().await {
            Ok(toggle) => println!("(dictation {:?})", toggle),
            Err(e) => println!("({})", e),
        },
        Command::Speak(id) => match app.session.message(MessageId(id)) {
            Some(message) => match app.voice.speak(&message.content, message.id).await {
                Ok(toggle) => println!("(playback {:?})", toggle),
                Err(e) => println!("({})", e),
            },
            None => println!("(no message {})", id),
        },
        Command::Cancel => {
            if !app.session.cancel_reveal() {
                println!("(nothing to cancel)");
            }
        }
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = if config_file.exists() {
        match DocuchatConfig::load(&config_file) {
            Ok(config) => (config, None),
            Err(e) => (DocuchatConfig::default(), Some(e)),
        }
    } else {
        (DocuchatConfig::default(), None)
    };
    args.apply_overrides(&mut config);

    // Tracing.
    let level = config.general.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting docuchat v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = load_error {
        tracing::warn!(path = %config_file.display(), error = %e, "Invalid config, using defaults");
    }
    config.validate()?;

    // Collaborators.
    let events = EventBus::new();
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let importer = HttpCloudImporter::new(&config.backend)?;
    tracing::info!(base_url = %backend.base_url(), "Answering backend configured");

    // Session layer.
    let language = SharedLanguage::new(&initial_language(&config.general.language));
    let prompt = Arc::new(PromptTemplateStore::new());
    let session = Arc::new(ConversationSession::new(
        &config.chat,
        &config.streaming,
        backend,
        Arc::clone(&prompt),
        language.clone(),
        events.clone(),
    ));
    let voice = Arc::new(VoiceController::new(
        Arc::new(UnavailableSpeech),
        language.clone(),
        events.clone(),
        &config.voice,
    ));
    let uploads = UploadQueue::new(&config.upload, events.clone());
    let listeners = link_voice_and_session(&session, &voice, &events);
    let renderer = tokio::spawn(render_events(Arc::clone(&session), events.subscribe()));

    tracing::info!(
        project_id = config.chat.project_id,
        language = %language.get(),
        "Session ready"
    );

    let app = App {
        session,
        voice,
        uploads,
        importer,
        prompt,
        language,
        project_id: config.chat.project_id,
    };

    println!(
        "docuchat: project \"{}\" ({}). /help for commands.",
        app.session.project_name(),
        app.project_id
    );
    for message in app.session.messages() {
        println!("{}", message.content);
    }
    for (n, question) in app.session.starter_questions().iter().enumerate() {
        println!("  try: {}. {}", n + 1, question);
    }

    // Prompt.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !execute(&app, parse_command(&line)).await {
            break;
        }
    }

    // Shutdown.
    app.session.cancel_reveal();
    app.voice.interrupt_playback();
    app.uploads.shutdown();
    for handle in listeners {
        handle.abort();
    }
    renderer.abort();
    tracing::info!("docuchat stopped");

    Ok(())
}
