//! Terminal presentation: a pure projection of the engine's event stream.
//! The engine never sees this module; it only fills the channel.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Stdout};
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::tty::IsTty;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph};
use tokio::sync::mpsc;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::event::{Event, TimerScope};
use crate::model::{ReviewVerdict, TrackedPullRequest};
use crate::notify::notify_ready;

/// Everything the dashboard knows, keyed and ordered by pull request key.
pub struct Dashboard {
    prs: BTreeMap<String, TrackedPullRequest>,
    countdowns: HashMap<String, String>,
    list_countdown: String,
    selected_idx: usize,
}

/// A pull request just became fully approved and fresh.
pub struct ReadyAlert {
    pub title: String,
    pub repo: String,
}

impl Dashboard {
    pub fn new() -> Self {
        Dashboard {
            prs: BTreeMap::new(),
            countdowns: HashMap::new(),
            list_countdown: String::new(),
            selected_idx: 0,
        }
    }

    /// Folds one engine event into the view state.
    fn apply(&mut self, event: Event) -> Option<ReadyAlert> {
        match event {
            Event::PullRequestDiscovered(pr) => {
                self.prs.insert(pr.key.clone(), pr);
                None
            }
            Event::PullRequestUpdated(pr) => {
                let was_ready = self.prs.get(&pr.key).is_some_and(|p| p.ready);
                let alert = (pr.ready && !was_ready).then(|| ReadyAlert {
                    title: pr.title.clone(),
                    repo: pr.repo.clone(),
                });
                self.prs.insert(pr.key.clone(), pr);
                alert
            }
            Event::PullRequestRemoved(key) => {
                self.prs.remove(&key);
                self.countdowns.remove(&key);
                None
            }
            Event::TimerTick { scope, value } => {
                match scope {
                    TimerScope::WatchList => self.list_countdown = value,
                    TimerScope::PullRequest(key) => {
                        self.countdowns.insert(key, value);
                    }
                }
                None
            }
        }
    }

    fn rows(&self) -> Vec<&TrackedPullRequest> {
        self.prs.values().collect()
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Dashboard::new()
    }
}

fn human_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let d = now.signed_duration_since(then).num_seconds().max(0);
    if d < 60 {
        "now".to_string()
    } else if d < 3600 {
        format!("{}m ago", d / 60)
    } else if d < 86400 {
        format!("{}h ago", d / 3600)
    } else {
        format!("{}d ago", d / 86400)
    }
}

fn reviewer_mark(state: Option<ReviewVerdict>, stale: bool) -> &'static str {
    match state {
        Some(ReviewVerdict::Approved) => {
            if stale {
                "✔~"
            } else {
                "✔"
            }
        }
        Some(ReviewVerdict::ChangesRequested) => "✖",
        Some(ReviewVerdict::Commented) => "💬",
        Some(ReviewVerdict::Dismissed) => "∅",
        Some(ReviewVerdict::Pending) | Some(ReviewVerdict::Unknown) | None => "·",
    }
}

fn reviewer_summary(pr: &TrackedPullRequest) -> String {
    if pr.reviewers.is_empty() {
        return "no reviewers".to_string();
    }
    pr.reviewers
        .iter()
        .map(|(login, status)| format!("{login} {}", reviewer_mark(status.state, status.stale)))
        .collect::<Vec<_>>()
        .join("  ")
}

fn status_text(pr: &TrackedPullRequest, now: DateTime<Utc>) -> String {
    if pr.ready {
        return "✅ ready".to_string();
    }
    if pr.branch_mismatch {
        return format!("⚠ base {}", pr.base_branch);
    }
    let total = pr.reviewers.len();
    if total == 0 {
        return format!("⏺ no reviewers {}", human_age(now, pr.updated_at));
    }
    let fresh = pr
        .reviewers
        .values()
        .filter(|s| s.state == Some(ReviewVerdict::Approved) && !s.stale)
        .count();
    format!("{fresh}/{total} approved {}", human_age(now, pr.updated_at))
}

fn truncate_ellipsis(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }

    let mut out = String::new();
    let mut w = 0usize;
    for ch in s.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if w + cw > max_width {
            break;
        }
        out.push(ch);
        w += cw;
    }

    if !out.is_empty() {
        while UnicodeWidthStr::width(out.as_str()) + 1 > max_width {
            out.pop();
        }
        if !out.is_empty() {
            out.push('…');
        }
    } else if max_width >= 1 {
        out.push('…');
    }
    out
}

fn pad_right(s: &str, width: usize) -> String {
    let len = UnicodeWidthStr::width(s);
    if len >= width {
        s.to_string()
    } else {
        let mut out = String::with_capacity(width);
        out.push_str(s);
        out.extend(std::iter::repeat(' ').take(width - len));
        out
    }
}

fn open_in_browser(url: &str) {
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = url;
        return;
    }

    #[cfg(target_os = "macos")]
    let mut cmd = {
        let mut c = Command::new("open");
        c.arg(url);
        c
    };

    #[cfg(target_os = "linux")]
    let mut cmd = {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    };

    let _ = cmd.spawn();
}

fn build_lines(
    dash: &Dashboard,
    inner_width: u16,
    inner_height: u16,
    now: DateTime<Utc>,
) -> Vec<Line<'static>> {
    let rows = dash.rows();
    let mut lines: Vec<Line<'static>> = Vec::new();

    let iw = inner_width as usize;
    let prefix_w = 2usize;
    let sep_w = 2usize;

    let max_repo_len = rows
        .iter()
        .map(|p| UnicodeWidthStr::width(p.repo.as_str()))
        .max()
        .unwrap_or(10);
    let repo_w = max_repo_len.clamp(8, 30);
    let num_w = 6usize;
    let next_w = 5usize;

    let max_status_len = rows
        .iter()
        .map(|p| UnicodeWidthStr::width(status_text(p, now).as_str()))
        .max()
        .unwrap_or(10);
    let status_w = max_status_len.clamp(10, 26);

    let max_rev_len = rows
        .iter()
        .map(|p| UnicodeWidthStr::width(reviewer_summary(p).as_str()))
        .max()
        .unwrap_or(12);
    let reviewers_w = max_rev_len.clamp(12, 40);

    let fixed = prefix_w + repo_w + sep_w + num_w + sep_w + sep_w + reviewers_w + sep_w + status_w + sep_w + next_w;
    let title_w = iw.saturating_sub(fixed).max(12);

    lines.push(Line::from(Span::styled(
        format!(
            "  {}  {}  {}  {}  {}  {}",
            pad_right("REPO", repo_w),
            pad_right("PR", num_w),
            pad_right("TITLE", title_w),
            pad_right("REVIEWERS", reviewers_w),
            pad_right("STATUS", status_w),
            pad_right("NEXT", next_w),
        ),
        Style::default().add_modifier(Modifier::DIM),
    )));

    for (idx, pr) in rows.iter().enumerate() {
        if (lines.len() as u16) >= inner_height {
            break;
        }
        let is_selected = idx == dash.selected_idx;
        let prefix = if is_selected { "> " } else { "  " };

        let repo = pad_right(&truncate_ellipsis(&pr.repo, repo_w), repo_w);
        let num = pad_right(&truncate_ellipsis(&format!("#{}", pr.number), num_w), num_w);
        let title = pad_right(&truncate_ellipsis(&pr.title, title_w), title_w);
        let reviewers = pad_right(&truncate_ellipsis(&reviewer_summary(pr), reviewers_w), reviewers_w);
        let status = pad_right(&truncate_ellipsis(&status_text(pr, now), status_w), status_w);
        let next = pad_right(
            dash.countdowns.get(&pr.key).map(String::as_str).unwrap_or("-"),
            next_w,
        );

        let style = if is_selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else if pr.ready {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        lines.push(Line::from(Span::styled(
            format!("{prefix}{repo}  {num}  {title}  {reviewers}  {status}  {next}"),
            style,
        )));
    }

    if rows.is_empty() {
        lines.push(Line::from(Span::raw("  waiting for pull requests…")));
    }

    lines
}

fn clamp_selection(selected: &mut usize, rows: usize) {
    if rows == 0 {
        *selected = 0;
    } else if *selected >= rows {
        *selected = rows - 1;
    }
}

pub fn run(
    mut events: mpsc::UnboundedReceiver<Event>,
    mut dash: Dashboard,
    notifications: bool,
) -> io::Result<()> {
    if !io::stdin().is_tty() || !io::stdout().is_tty() {
        return Err(io::Error::other(
            "not a TTY: run `prowatch` in an interactive terminal",
        ));
    }
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal: Terminal<CrosstermBackend<Stdout>> = Terminal::new(backend)?;

    loop {
        while let Ok(ev) = events.try_recv() {
            if let Some(alert) = dash.apply(ev) {
                if notifications {
                    notify_ready(&alert.title, &alert.repo);
                }
            }
        }
        clamp_selection(&mut dash.selected_idx, dash.prs.len());

        let area = terminal.size()?;
        let inner_height = area.height.saturating_sub(2);
        let inner_width = area.width.saturating_sub(2);
        let lines = build_lines(&dash, inner_width, inner_height, Utc::now());

        let header = if dash.list_countdown.is_empty() {
            format!(" prowatch — {} open ", dash.prs.len())
        } else {
            format!(
                " prowatch — {} open — next scan {} ",
                dash.prs.len(),
                dash.list_countdown
            )
        };

        terminal.draw(|f| {
            let chunks = Layout::default()
                .constraints([Constraint::Percentage(100)])
                .split(f.area());
            let block = Block::default().borders(Borders::ALL).title(header.clone());
            let paragraph = Paragraph::new(Text::from(lines.clone())).block(block);
            f.render_widget(paragraph, chunks[0]);
        })?;

        // Keep the UI responsive on quit/navigation.
        if event::poll(Duration::from_millis(50))? {
            if let TermEvent::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match k.code {
                    KeyCode::Char('q') => break,
                    KeyCode::Up => {
                        if dash.selected_idx > 0 {
                            dash.selected_idx -= 1;
                        }
                    }
                    KeyCode::Down => {
                        if dash.selected_idx + 1 < dash.prs.len() {
                            dash.selected_idx += 1;
                        }
                    }
                    KeyCode::Enter => {
                        if let Some(pr) = dash.rows().get(dash.selected_idx) {
                            open_in_browser(&pr.html_url);
                        }
                    }
                    KeyCode::Char('t') => {
                        if let Some(url) = dash
                            .rows()
                            .get(dash.selected_idx)
                            .and_then(|pr| pr.ticket_url.clone())
                        {
                            open_in_browser(&url);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
