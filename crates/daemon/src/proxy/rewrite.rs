// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Textual HTML rewriting for session-scoped responses. Substitutions are
//! string matches, not an HTML parse — they only match a leading `/` so
//! already-prefixed URLs are never double-prefixed.

use once_cell::sync::Lazy;
use regex::Regex;

static SRC_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(src|href)="(/(?:[^"]*))""#).expect("valid regex"));
static ESM_FROM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"from\s+'(/(?:[^']*))'"#).expect("valid regex"));
static DYNAMIC_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\((['"])(/(?:[^'"]*))\1\)"#).expect("valid regex"));
static LOOPBACK_WS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"ws://(?:127\.0\.0\.1|localhost):\d+(/[^"'\s]*)?"#).expect("valid regex"));

fn already_prefixed(path: &str) -> bool {
    path.trim_start_matches('/').starts_with("session/")
}

/// Rewrites root-relative URLs in an HTML body so they route back through
/// `/session/{session_id}/...`, and rewrites any loopback dev-server
/// WebSocket URL to the public edge over `wss`. The bootstrap path
/// `/@vite/client` needs no dedicated pass — it is always referenced as a
/// `src="/@vite/client"` attribute or an ESM import, both of which the
/// passes above already rewrite; a separate unconditional substitution on
/// the already-rewritten body would double-prefix it.
pub fn rewrite_html(body: &str, session_id: &str, public_host: &str) -> String {
    let prefix = format!("/session/{session_id}");

    let step = SRC_HREF_RE.replace_all(body, |caps: &regex::Captures| {
        let attr = &caps[1];
        let path = &caps[2];
        if already_prefixed(path) {
            format!(r#"{attr}="{path}""#)
        } else {
            format!(r#"{attr}="{prefix}{path}""#)
        }
    });

    let step = ESM_FROM_RE.replace_all(&step, |caps: &regex::Captures| {
        let path = &caps[1];
        if already_prefixed(path) {
            format!("from '{path}'")
        } else {
            format!("from '{prefix}{path}'")
        }
    });

    let step = DYNAMIC_IMPORT_RE.replace_all(&step, |caps: &regex::Captures| {
        let quote = &caps[1];
        let path = &caps[2];
        if already_prefixed(path) {
            format!("import({quote}{path}{quote})")
        } else {
            format!("import({quote}{prefix}{path}{quote})")
        }
    });

    let step = LOOPBACK_WS_RE
        .replace_all(&step, |_: &regex::Captures| {
            format!("wss://{public_host}{prefix}")
        })
        .into_owned();

    step
}
