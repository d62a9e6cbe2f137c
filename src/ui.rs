//! TUI module using ratatui.
//!
//! Two tabs, Text and Document, over one [`Session`]. Summarization runs on the
//! event loop and blocks input until it returns.

use crate::chunker::ChunkMode;
use crate::config::Config;
use crate::document::PdfDocument;
use crate::guard::SummaryOutcome;
use crate::hub::HubLoader;
use crate::models::{ModelLoader, ModelName};
use crate::session::{ChunkSummary, Session};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use tracing::warn;

type Term = Terminal<CrosstermBackend<io::Stdout>>;

const HELP: &str = "Tab: switch tab | F2: switch model | Esc: quit";
const NO_MODEL: &str = "No model loaded, press F2 to try another";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Text,
    Document,
}

impl Tab {
    const TITLES: [&'static str; 2] = ["Text", "Document"];

    fn index(self) -> usize {
        match self {
            Tab::Text => 0,
            Tab::Document => 1,
        }
    }

    fn next(self) -> Self {
        match self {
            Tab::Text => Tab::Document,
            Tab::Document => Tab::Text,
        }
    }
}

/// What the event loop should do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    SwitchModel,
    SummarizeText,
    SummarizeDocument,
}

/// Everything on screen apart from the session itself.
#[derive(Debug, Default)]
pub struct View {
    pub model: ModelName,
    /// False when `model` failed to load
    pub model_ready: bool,
    pub tab: Tab,
    pub text_input: String,
    pub text_result: Option<SummaryOutcome>,
    pub path_input: String,
    pub document_name: Option<String>,
    pub document_results: Vec<ChunkSummary>,
    pub status: String,
}

impl View {
    fn new(model: ModelName) -> Self {
        Self {
            model,
            model_ready: true,
            status: HELP.to_string(),
            ..Default::default()
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Action::Quit,
            KeyCode::Char('c') if ctrl => return Action::Quit,
            KeyCode::Tab => {
                self.tab = self.tab.next();
                return Action::None;
            }
            KeyCode::F(2) => return Action::SwitchModel,
            _ => {}
        }

        match self.tab {
            Tab::Text => match key.code {
                KeyCode::Char('g') if ctrl => Action::SummarizeText,
                KeyCode::Enter => {
                    self.text_input.push('\n');
                    Action::None
                }
                KeyCode::Backspace => {
                    self.text_input.pop();
                    Action::None
                }
                KeyCode::Char(c) if !ctrl => {
                    self.text_input.push(c);
                    Action::None
                }
                _ => Action::None,
            },
            Tab::Document => match key.code {
                KeyCode::Enter => Action::SummarizeDocument,
                KeyCode::Backspace => {
                    self.path_input.pop();
                    Action::None
                }
                KeyCode::Char(c) if !ctrl => {
                    self.path_input.push(c);
                    Action::None
                }
                _ => Action::None,
            },
        }
    }
}

/// Launch the TUI with `model` active
pub async fn run(config: &Config, model: ModelName) -> Result<()> {
    let mut terminal = init_terminal()?;
    let result = run_app(&mut terminal, config, model).await;
    restore_terminal(terminal)?;
    result
}

/// The session, if a model could be loaded, and what is on screen.
struct App {
    view: View,
    session: Option<Session>,
    chunk_mode: ChunkMode,
}

impl App {
    /// Load `model`; a failure is shown in the status line instead of ending the UI
    async fn start(loader: Box<dyn ModelLoader>, model: ModelName, chunk_mode: ChunkMode) -> Self {
        let mut view = View::new(model);
        let session = match Session::open(loader, model, chunk_mode).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "initial model load failed");
                view.status = format!("Error: {e} | {NO_MODEL}");
                None
            }
        };
        view.model_ready = session.is_some();

        Self {
            view,
            session,
            chunk_mode,
        }
    }

    /// Move to the next model, opening a session with `loader` if none is open
    async fn switch_model(&mut self, loader: Box<dyn ModelLoader>) {
        let next = self.view.model.next();

        let result = match &mut self.session {
            Some(session) => session.select_model(next).await.map(|_| ()),
            slot @ None => Session::open(loader, next, self.chunk_mode)
                .await
                .map(|session| *slot = Some(session)),
        };

        match result {
            Ok(()) => {
                self.view.model = next;
                self.view.model_ready = true;
                self.view.status = HELP.to_string();
            }
            Err(e) => self.view.status = format!("Error: {e}"),
        }
    }

    fn summarize_text(&mut self) {
        let Some(session) = &self.session else {
            self.view.status = NO_MODEL.to_string();
            return;
        };

        self.view.status = match session.summarize_text(&self.view.text_input) {
            Ok(outcome) => {
                self.view.text_result = Some(outcome);
                HELP.to_string()
            }
            Err(e) => format!("Error: {e}"),
        };
    }
}

async fn run_app(terminal: &mut Term, config: &Config, model: ModelName) -> Result<()> {
    render_loading(terminal, &format!("Loading {model}..."))?;
    let loader = Box::new(HubLoader::new(config));
    let mut app = App::start(loader, model, config.chunking.mode).await;

    loop {
        terminal.draw(|frame| draw(frame, &app.view))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.view.handle_key(key) {
            Action::None => {}
            Action::Quit => return Ok(()),
            Action::SwitchModel => {
                app.view.status = format!("Loading {}...", app.view.model.next());
                terminal.draw(|frame| draw(frame, &app.view))?;
                app.switch_model(Box::new(HubLoader::new(config))).await;
            }
            Action::SummarizeText => {
                app.view.status = "Summarizing...".to_string();
                terminal.draw(|frame| draw(frame, &app.view))?;
                app.summarize_text();
            }
            Action::SummarizeDocument => match &app.session {
                Some(session) => summarize_document(terminal, session, &mut app.view)?,
                None => app.view.status = NO_MODEL.to_string(),
            },
        }
    }
}

fn summarize_document(terminal: &mut Term, session: &Session, view: &mut View) -> Result<()> {
    view.document_results.clear();
    view.document_name = None;

    let doc = match PdfDocument::open(view.path_input.trim()) {
        Ok(doc) => doc,
        Err(e) => {
            view.status = format!("Error: {e}");
            return Ok(());
        }
    };
    view.document_name = Some(doc.name().to_string());
    view.status = "Summarizing...".to_string();
    terminal.draw(|frame| draw(frame, view))?;

    // Redraw after every chunk so summaries appear as they are produced
    let result = session.summarize_document(&doc, |chunk| {
        view.document_results.push(chunk);
        if let Err(e) = terminal.draw(|frame| draw(frame, view)) {
            warn!(error = %e, "failed to redraw");
        }
    });

    view.status = match result {
        Ok(0) => format!("No text found in {}", doc.name()),
        Ok(n) => format!("Summarized {n} chunks | {HELP}"),
        Err(e) => format!("Error: {e}"),
    };
    Ok(())
}

fn draw(frame: &mut Frame, view: &View) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            "Text Summarization App",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        if view.model_ready {
            Line::from(format!("Using the {} model (F2 to switch)", view.model))
        } else {
            Line::styled(
                format!("Could not load the {} model (F2 to switch)", view.model),
                Style::default().fg(Color::Red),
            )
        },
    ])
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, rows[0]);

    let tabs = Tabs::new(Tab::TITLES.to_vec())
        .select(view.tab.index())
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, rows[1]);

    match view.tab {
        Tab::Text => draw_text_tab(frame, rows[2], view),
        Tab::Document => draw_document_tab(frame, rows[2], view),
    }

    let status = Paragraph::new(view.status.as_str()).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, rows[3]);
}

fn draw_text_tab(frame: &mut Frame, area: Rect, view: &View) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(50),
            Constraint::Min(3),
        ])
        .split(area);

    frame.render_widget(section_header("Text Summarization"), parts[0]);

    let input = Paragraph::new(view.text_input.as_str())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Enter your text here (Ctrl+G to generate)"),
        );
    frame.render_widget(input, parts[1]);

    let result = match &view.text_result {
        Some(outcome) => Paragraph::new(outcome.text()).style(outcome_style(outcome)),
        None => Paragraph::new(""),
    };
    frame.render_widget(
        result
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Generated Summary:")),
        parts[2],
    );
}

fn draw_document_tab(frame: &mut Frame, area: Rect, view: &View) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(area);

    frame.render_widget(section_header("Document Summarization"), parts[0]);

    let path = Paragraph::new(view.path_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("PDF file path (Enter to summarize)"),
    );
    frame.render_widget(path, parts[1]);

    let title = match &view.document_name {
        Some(name) => format!("Generated Summary for {name}:"),
        None => "Generated Summary:".to_string(),
    };
    let mut lines = Vec::new();
    for chunk in &view.document_results {
        lines.push(Line::styled(
            chunk.outcome.text().to_string(),
            outcome_style(&chunk.outcome),
        ));
        lines.push(Line::default());
    }
    let results = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(results, parts[2]);
}

fn section_header(title: &str) -> Paragraph<'_> {
    Paragraph::new(Span::styled(
        title,
        Style::default().add_modifier(Modifier::BOLD),
    ))
}

fn outcome_style(outcome: &SummaryOutcome) -> Style {
    if outcome.is_rejected() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

/// Initialize terminal
fn init_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

/// Restore terminal
fn restore_terminal(mut terminal: Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Render a centered status message while something slow runs
fn render_loading(terminal: &mut Term, message: &str) -> Result<()> {
    terminal.draw(|frame| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage(45),
                Constraint::Length(3),
                Constraint::Percentage(45),
            ])
            .split(frame.area());

        let paragraph = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(paragraph, chunks[1]);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::scripted_handle;
    use crate::models::{ModelError, ModelHandle};
    use async_trait::async_trait;

    /// Loads every model except `broken`; each replies with its own name.
    struct PickyLoader {
        broken: Option<ModelName>,
    }

    #[async_trait]
    impl ModelLoader for PickyLoader {
        async fn load(&self, name: ModelName) -> Result<ModelHandle, ModelError> {
            if self.broken == Some(name) {
                return Err(ModelError::Load {
                    model: name,
                    reason: "offline".into(),
                });
            }
            Ok(scripted_handle(name, name.as_str()).0)
        }
    }

    fn loader(broken: Option<ModelName>) -> Box<dyn ModelLoader> {
        Box::new(PickyLoader { broken })
    }

    #[tokio::test]
    async fn test_failed_initial_load_keeps_ui_running() {
        let mut app = App::start(
            loader(Some(ModelName::AmazonReviewBart)),
            ModelName::AmazonReviewBart,
            ChunkMode::Lossless,
        )
        .await;

        assert!(app.session.is_none());
        assert!(!app.view.model_ready);
        assert!(app.view.status.starts_with("Error: failed to load"));

        app.view.text_input = "hello".to_string();
        app.summarize_text();
        assert_eq!(app.view.status, NO_MODEL);
        assert!(app.view.text_result.is_none());

        app.switch_model(loader(None)).await;
        assert_eq!(app.view.model, ModelName::ReviewSummarizerEn);
        assert!(app.view.model_ready);

        app.summarize_text();
        assert_eq!(
            app.view.text_result.as_ref().map(|outcome| outcome.text()),
            Some(ModelName::ReviewSummarizerEn.as_str())
        );
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_current_model() {
        let mut app = App::start(
            loader(Some(ModelName::ReviewSummarizerEn)),
            ModelName::AmazonReviewBart,
            ChunkMode::Lossless,
        )
        .await;
        assert!(app.view.model_ready);

        app.switch_model(loader(None)).await;

        assert_eq!(app.view.model, ModelName::AmazonReviewBart);
        assert!(app.view.model_ready);
        assert!(app.view.status.starts_with("Error: failed to load"));
    }

    #[test]
    fn test_header_shows_unloaded_model() {
        use ratatui::backend::TestBackend;

        let mut view = View::new(ModelName::AmazonReviewBart);
        view.model_ready = false;

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| draw(frame, &view)).unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Could not load the mabrouk/amazon-review-summarizer-bart model"));
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(view: &mut View, s: &str) {
        for c in s.chars() {
            assert_eq!(view.handle_key(key(KeyCode::Char(c))), Action::None);
        }
    }

    #[test]
    fn test_typing_goes_to_active_tab() {
        let mut view = View::new(ModelName::default());
        type_str(&mut view, "hi");
        view.handle_key(key(KeyCode::Enter));
        type_str(&mut view, "there");
        assert_eq!(view.text_input, "hi\nthere");

        view.handle_key(key(KeyCode::Tab));
        assert_eq!(view.tab, Tab::Document);
        type_str(&mut view, "a.pdf");
        view.handle_key(key(KeyCode::Backspace));
        assert_eq!(view.path_input, "a.pd");
        assert_eq!(view.text_input, "hi\nthere");
    }

    #[test]
    fn test_action_keys() {
        let mut view = View::new(ModelName::default());
        assert_eq!(view.handle_key(ctrl('g')), Action::SummarizeText);
        assert_eq!(view.handle_key(key(KeyCode::F(2))), Action::SwitchModel);
        assert_eq!(view.handle_key(ctrl('c')), Action::Quit);
        assert_eq!(view.handle_key(key(KeyCode::Esc)), Action::Quit);

        view.handle_key(key(KeyCode::Tab));
        assert_eq!(view.handle_key(key(KeyCode::Enter)), Action::SummarizeDocument);
        assert!(view.path_input.is_empty());
    }

    #[test]
    fn test_control_chords_are_not_typed() {
        let mut view = View::new(ModelName::default());
        view.handle_key(ctrl('x'));
        assert!(view.text_input.is_empty());
    }

    #[test]
    fn test_draw_renders_model_and_results() {
        use ratatui::backend::TestBackend;

        let mut view = View::new(ModelName::ReviewSummarizerEn);
        view.tab = Tab::Document;
        view.document_name = Some("report.pdf".to_string());
        view.document_results = vec![
            ChunkSummary {
                index: 0,
                outcome: SummaryOutcome::Summary("first part".to_string()),
            },
            ChunkSummary {
                index: 1,
                outcome: SummaryOutcome::Rejected,
            },
        ];

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| draw(frame, &view)).unwrap();

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content.iter().map(|cell| cell.symbol()).collect();
        assert!(screen.contains("Using the MurkatG/review-summarizer-en model"));
        assert!(screen.contains("Generated Summary for report.pdf:"));
        assert!(screen.contains("first part"));
        assert!(screen.contains("Text input is too long."));
    }
}
