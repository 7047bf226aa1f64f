use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::animation::PlaybackState;
use crate::app::{App, DetailsStatus, Screen};
use crate::models::Platform;
use crate::pointer::Slot;
use crate::remote::RemoteDetails;
use crate::viewer::Display;

pub fn draw(frame: &mut Frame, app: &App) {
    let banner_height = if app.store_error.is_some() { 1 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),             // Platform tabs + view settings
            Constraint::Length(banner_height), // Store banner
            Constraint::Min(0),                // Lists or viewer
            Constraint::Length(1),             // Status line
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    if let Some(error) = &app.store_error {
        let banner = Paragraph::new(format!(" Library database unavailable: {error}"))
            .style(Style::default().fg(Color::Black).bg(Color::Red));
        frame.render_widget(banner, chunks[1]);
    }

    match app.screen {
        Screen::Artists | Screen::Posts => {
            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(2, 3)])
                .split(chunks[2]);
            render_artist_list(frame, app, panes[0]);
            render_post_list(frame, app, panes[1]);
        }
        Screen::Viewer => {
            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Ratio(3, 5), Constraint::Ratio(2, 5)])
                .split(chunks[2]);
            render_viewer(frame, app, panes[0]);
            render_details(frame, app, panes[1]);
        }
    }

    render_status(frame, app, chunks[3]);

    if app.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    for platform in Platform::ALL {
        let style = if platform == app.platform {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", platform.label()), style));
        spans.push(Span::raw(" "));
    }

    let filter = if app.view.only_unviewed { "Unviewed" } else { "All" };
    spans.push(Span::styled(
        format!(
            "  [{filter}]  Sort: {} {}",
            app.view.sort_key.label(),
            app.view.sort_order.label()
        ),
        Style::default().fg(Color::White),
    ));

    let block = Block::default()
        .title(" Creator Shelf ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}

fn render_artist_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .artists
        .iter()
        .map(|artist| {
            let (marker, style) = if artist.has_unviewed {
                ("● ", Style::default().fg(Color::White))
            } else {
                ("  ", Style::default().fg(Color::DarkGray))
            };

            let line = Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Yellow)),
                Span::styled(artist.display_name.as_str(), style),
                Span::styled(format!(" ({})", artist.service), Style::default().fg(Color::Blue)),
            ]);
            ListItem::new(line)
        })
        .collect();

    let border = if app.screen == Screen::Artists {
        Color::Green
    } else {
        Color::DarkGray
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" Artists ({}) ", app.artists.len()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.artists.is_empty() {
        state.select(Some(app.artist_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_post_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .posts
        .iter()
        .map(|post| {
            let style = if post.viewed {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            let date = post
                .published_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "----------".to_string());

            let line = Line::from(vec![
                Span::styled(format!("{date} "), Style::default().fg(Color::Blue)),
                Span::styled(post.title.as_str(), style),
                Span::styled(
                    format!(" [{}]", post.attachment_count),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
            ListItem::new(line)
        })
        .collect();

    let title = app
        .selected_artist()
        .filter(|_| app.screen == Screen::Posts)
        .map(|a| format!(" {} ", a.display_name))
        .unwrap_or_else(|| " Posts ".to_string());
    let border = if app.screen == Screen::Posts {
        Color::Green
    } else {
        Color::DarkGray
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.posts.is_empty() {
        state.select(Some(app.post_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_viewer(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Viewer ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let Some(viewer) = &app.viewer else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };
    let pointer = viewer.pointer();
    let position = pointer.position();

    let label = Style::default().fg(Color::Blue);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Artist     ", label),
            Span::raw(format!(
                "{} ({}/{})",
                pointer.current_artist().display_name,
                position.artist + 1,
                pointer.artists().len()
            )),
        ]),
        Line::from(vec![
            Span::styled("Post       ", label),
            Span::raw(format!(
                "{} ({}/{})",
                pointer.current_post().map(|p| p.title.as_str()).unwrap_or("-"),
                position.post + 1,
                pointer.current_posts().len()
            )),
        ]),
        Line::from(vec![
            Span::styled("Attachment ", label),
            Span::raw(match position.slot {
                Slot::At(i) => format!(
                    "{} ({}/{})",
                    pointer.current_attachment().unwrap_or("-"),
                    i + 1,
                    pointer.attachments().len()
                ),
                Slot::Empty => "(no attachments)".to_string(),
            }),
        ]),
        Line::from(""),
    ];

    let display = match viewer.display() {
        Display::Empty => "Nothing to show in this post".to_string(),
        Display::Loading(_) => "Loading...".to_string(),
        Display::Still { width, height, .. } => format!("Image {width}x{height}"),
        Display::Animated {
            frames,
            width,
            height,
            ..
        } => format!("Animation {width}x{height}, {frames} frames"),
        Display::Failed { reason, .. } => format!("Cannot display: {reason}"),
    };
    lines.push(Line::from(display));

    if let (Some(index), Some(count)) = (viewer.frame_index(), viewer.frame_count()) {
        let state = match viewer.playback_state() {
            Some(PlaybackState::Playing) => "▶ playing",
            Some(PlaybackState::ManuallyScrubbing) => "⇆ scrubbing",
            _ => "■ stopped",
        };
        let delay = viewer
            .current_frame()
            .map(|f| format!(" ({} ms)", f.duration.as_millis()))
            .unwrap_or_default();
        lines.push(Line::from(format!("Frame {}/{count}{delay}  {state}", index + 1)));
    }

    if let Some(path) = viewer.display().path() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            path.display().to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_details(frame: &mut Frame, app: &App, area: Rect) {
    let (title, content) = match &app.details_status {
        DetailsStatus::Idle => (" Details ", "Press 'c' to fetch comments or tags".to_string()),
        DetailsStatus::Loading => (" Details ", "Fetching...".to_string()),
        DetailsStatus::Failed(e) => (" Details ", format!("Fetch failed: {e}")),
        DetailsStatus::Loaded(RemoteDetails::Comments(comments)) => {
            let text = if comments.is_empty() {
                "No comments".to_string()
            } else {
                comments
                    .iter()
                    .map(|c| {
                        format!(
                            "{}: {}",
                            c.commenter_name.as_deref().unwrap_or("anonymous"),
                            c.content
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            };
            (" Comments ", text)
        }
        DetailsStatus::Loaded(RemoteDetails::Tags(tags)) => {
            let text = tags
                .iter()
                .map(|t| match &t.translation {
                    Some(en) => format!("#{} ({en})", t.name),
                    None => format!("#{}", t.name),
                })
                .collect::<Vec<_>>()
                .join("\n");
            (" Tags ", text)
        }
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let text = if let Some(message) = &app.status_message {
        message.clone()
    } else {
        match (&app.viewer, app.screen) {
            (Some(viewer), Screen::Viewer) => {
                let auto = if viewer.auto_play() { "auto-play on" } else { "auto-play off" };
                let show = if viewer.slideshow_active() { " | slideshow" } else { "" };
                let scrub = if viewer.is_scrubbing() { " | scrub" } else { "" };
                format!("{auto}{show}{scrub}  h/l:prev/next  space:play  [/]:frame  s:slideshow  ?:help")
            }
            _ => "j/k:nav  Enter:open  Tab:platform  f:filter  o/O:sort  ?:help  q:quit".to_string(),
        }
    };

    let paragraph = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 70, frame.area());

    let help_text = vec![
        "",
        " Lists:",
        "   j / ↓    Move down",
        "   k / ↑    Move up",
        "   Enter    Open artist / post",
        "   Esc      Back",
        "   Tab      Next platform",
        "",
        " Viewer:",
        "   l / h    Next / previous image",
        "   space    Toggle auto-play",
        "   [ / ]    Previous / next frame",
        "   g        Scrub mode",
        "   s        Slideshow",
        "   c        Fetch comments / tags",
        "",
        " Actions:",
        "   m        Toggle post viewed",
        "   M        Toggle artist viewed",
        "   f        Unviewed only",
        "   o / O    Sort key / order",
        "   x        Open externally",
        "",
        " General:",
        "   ?        Toggle this help",
        "   q        Quit",
        "",
        " Press any key to close",
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_text.join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(ratatui::widgets::Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
