//! Renders status messages.
//!
//! Every rendered message fits in [`MAX_MESSAGE_LENGTH`] characters. Client
//! lines and mention tokens are placed whole or not at all; clients that do
//! not fit are summarised by a trailing `... and N more` line.

use super::diff::Change;
use super::emoji;
use super::model::{ClientStatus, ScoreKind, ServerStatus};
use super::validation::MAX_MESSAGE_LENGTH;

/// Server names longer than this are cut before escaping.
const MAX_NAME_CHARS: usize = 128;

/// Stands in for backticks inside code spans.
const BACKTICK_REPLACEMENT: char = '\u{02CB}';

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Escape Discord markdown so user-controlled text renders literally.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '<' | '>' | '#') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn code_safe(text: &str) -> String {
    text.replace('`', &BACKTICK_REPLACEMENT.to_string())
}

fn display_name(name: &str) -> String {
    let name: String = name.chars().take(MAX_NAME_CHARS).collect();
    escape_markdown(&name)
}

/// `MM:SS` below an hour, `H:MM:SS` above.
pub fn format_time(seconds: i32) -> String {
    if seconds < 0 {
        return "--:--".to_string();
    }
    let (h, m, s) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

fn format_score(kind: ScoreKind, client: &ClientStatus) -> String {
    if !client.is_player {
        return "spectating".to_string();
    }
    match kind {
        ScoreKind::Points => client.score.to_string(),
        ScoreKind::Time => format_time(client.score),
    }
}

fn marker(omitted: usize) -> String {
    format!("\n... and {omitted} more")
}

fn header(status: &ServerStatus) -> String {
    format!(
        "**{}** ({}/{})",
        display_name(&status.name),
        status.clients.len(),
        status.max_clients
    )
}

/// One line per client, padded to the longest name and clan of the server.
pub fn client_lines(status: &ServerStatus) -> Vec<String> {
    let names: Vec<String> = status.clients.iter().map(|c| code_safe(&c.name)).collect();
    let clans: Vec<String> = status.clients.iter().map(|c| code_safe(&c.clan)).collect();
    let name_width = names.iter().map(|n| char_len(n)).max().unwrap_or(0).max(1);
    let clan_width = clans.iter().map(|c| char_len(c)).max().unwrap_or(0).max(1);

    status
        .clients
        .iter()
        .zip(names.iter().zip(&clans))
        .map(|(client, (name, clan))| {
            format!(
                "`{name:<name_width$}` `{clan:<clan_width$}` {} {}",
                emoji::flag(client.country),
                format_score(status.score_kind, client)
            )
        })
        .collect()
}

/// Render an online server, mentioning `mentions` as far as the budget allows.
pub fn render_status(status: &ServerStatus, mentions: &[u64]) -> String {
    let mut out = header(status);
    let lines = client_lines(status);
    let mut used = char_len(&out);

    // Keep room for the longest possible trailer before placing mentions.
    let reserved = if lines.is_empty() {
        0
    } else {
        char_len(&marker(lines.len()))
    };

    let mut first = true;
    for id in mentions {
        let token = format!("<@{id}>");
        let cost = char_len(&token) + 1;
        if used + cost + reserved > MAX_MESSAGE_LENGTH {
            break;
        }
        out.push(if first { '\n' } else { ' ' });
        out.push_str(&token);
        used += cost;
        first = false;
    }

    for (placed, line) in lines.iter().enumerate() {
        let after = lines.len() - placed - 1;
        let trailer = if after == 0 { 0 } else { char_len(&marker(after)) };
        let cost = char_len(line) + 1;
        if used + cost + trailer > MAX_MESSAGE_LENGTH {
            out.push_str(&marker(lines.len() - placed));
            return out;
        }
        out.push('\n');
        out.push_str(line);
        used += cost;
    }
    out
}

/// Render a server that dropped out of the list.
pub fn render_offline(status: &ServerStatus) -> String {
    format!(
        "**{}** is offline\n`{}`",
        display_name(&status.name),
        code_safe(&status.address)
    )
}

/// Content of a freshly created status message, until the first poll fills it.
pub fn render_placeholder(address: &str) -> String {
    format!("Waiting for `{}` to show up in the server list...", code_safe(address))
}

/// Render the new content of the message behind `change`.
pub fn render(change: &Change) -> String {
    match (&change.curr, &change.prev) {
        (Some(curr), _) => render_status(curr, &change.mentions),
        (None, Some(prev)) => render_offline(prev),
        (None, None) => render_placeholder(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{MessageTarget, NO_TIME};
    use crate::engine::validation::validate_message;

    fn client(name: &str, clan: &str, score: i32) -> ClientStatus {
        ClientStatus {
            name: name.into(),
            clan: clan.into(),
            country: -1,
            score,
            is_player: true,
            team: 0,
        }
    }

    fn status(clients: Vec<ClientStatus>) -> ServerStatus {
        ServerStatus {
            address: "1.2.3.4:8303".into(),
            name: "My *cool* server".into(),
            max_clients: 64,
            max_players: 64,
            clients,
            ..Default::default()
        }
        .canonical()
    }

    fn crowded(count: usize) -> ServerStatus {
        status(
            (0..count)
                .map(|i| client(&format!("player-with-a-long-name-{i:04}"), "SomeClan", 0))
                .collect(),
        )
    }

    fn trailing_count(rendered: &str) -> Option<usize> {
        let last = rendered.lines().last()?;
        last.strip_prefix("... and ")?
            .strip_suffix(" more")?
            .parse()
            .ok()
    }

    fn client_line_count(rendered: &str) -> usize {
        rendered.lines().filter(|l| l.starts_with('`')).count()
    }

    #[test]
    fn test_header_escapes_name() {
        let rendered = render_status(&status(vec![]), &[]);
        assert_eq!(rendered, "**My \\*cool\\* server** (0/64)");
    }

    #[test]
    fn test_client_lines_are_padded() {
        let s = status(vec![client("a", "", 5), client("bob", "XY", 3)]);
        let lines = client_lines(&s);
        let flag = emoji::DEFAULT_FLAG;
        assert_eq!(lines[0], format!("`a  ` `  ` {flag} 5"));
        assert_eq!(lines[1], format!("`bob` `XY` {flag} 3"));
    }

    #[test]
    fn test_empty_clans_keep_a_code_span() {
        let s = status(vec![client("a", "", 1)]);
        assert!(client_lines(&s)[0].starts_with("`a` ` ` "));
    }

    #[test]
    fn test_backticks_cannot_break_code_span() {
        let s = status(vec![client("a`b", "", 1)]);
        let line = &client_lines(&s)[0];
        assert_eq!(line.matches('`').count(), 4);
        assert!(line.contains('\u{02CB}'));
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(75), "01:15");
        assert_eq!(format_time(3599), "59:59");
        assert_eq!(format_time(3600), "1:00:00");
        assert_eq!(format_time(36_061), "10:01:01");
        assert_eq!(format_time(NO_TIME), "--:--");
        assert_eq!(format_time(-1), "--:--");
    }

    #[test]
    fn test_scores_by_kind() {
        let mut spectator = client("spec", "", NO_TIME);
        spectator.is_player = false;
        let mut s = status(vec![client("fast", "", 75), client("slow", "", NO_TIME), spectator]);
        s.score_kind = ScoreKind::Time;
        let s = s.canonical();
        let lines = client_lines(&s);
        assert!(lines[0].ends_with(" 01:15"));
        assert!(lines.iter().any(|l| l.ends_with(" --:--")));
        assert!(lines.iter().any(|l| l.ends_with(" spectating")));
    }

    #[test]
    fn test_mentions_line() {
        let rendered = render_status(&status(vec![client("a", "", 1)]), &[3, 7]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "<@3> <@7>");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_truncation_reports_exact_omitted_count() {
        let s = crowded(200);
        let rendered = render_status(&s, &[]);
        assert!(char_len(&rendered) <= MAX_MESSAGE_LENGTH);
        let shown = client_line_count(&rendered);
        let omitted = trailing_count(&rendered).unwrap();
        assert!(shown > 0);
        assert_eq!(shown + omitted, 200);
        assert!(validate_message(&rendered).is_ok());
    }

    #[test]
    fn test_no_truncation_when_everything_fits() {
        let rendered = render_status(&crowded(5), &[]);
        assert_eq!(client_line_count(&rendered), 5);
        assert_eq!(trailing_count(&rendered), None);
    }

    #[test]
    fn test_mentions_stop_before_budget() {
        let mentions: Vec<u64> = (0..400).map(|i| 100_000_000_000_000_000 + i).collect();
        let s = crowded(3);
        let rendered = render_status(&s, &mentions);
        assert!(char_len(&rendered) <= MAX_MESSAGE_LENGTH);

        let tokens: Vec<&str> = rendered.lines().nth(1).unwrap().split(' ').collect();
        assert!(tokens.len() < mentions.len());
        for (token, id) in tokens.iter().zip(&mentions) {
            assert_eq!(*token, format!("<@{id}>"));
        }
        // The reserved trailer always fits.
        let shown = client_line_count(&rendered);
        assert_eq!(shown + trailing_count(&rendered).unwrap_or(0), 3);
    }

    #[test]
    fn test_multibyte_names_count_characters() {
        let s = status(
            (0..100)
                .map(|i| client(&format!("{}{i}", "\u{00E9}".repeat(14)), "", i))
                .collect(),
        );
        let rendered = render_status(&s, &[]);
        assert!(char_len(&rendered) <= MAX_MESSAGE_LENGTH);
        assert_eq!(
            client_line_count(&rendered) + trailing_count(&rendered).unwrap_or(0),
            100
        );
    }

    #[test]
    fn test_render_offline_change() {
        let prev = status(vec![client("a", "", 1)]);
        let change = Change {
            target: MessageTarget::new(1, 2, 3),
            prev: Some(prev),
            curr: None,
            mentions: Vec::new(),
        };
        assert_eq!(
            render(&change),
            "**My \\*cool\\* server** is offline\n`1.2.3.4:8303`"
        );
    }

    #[test]
    fn test_placeholder_mentions_address() {
        assert!(render_placeholder("1.2.3.4:8303").contains("`1.2.3.4:8303`"));
    }
}
