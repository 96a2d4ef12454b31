use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::entry::{Author, Comment, CommentEntry, Tests};

static ISSUE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^@\]]*)@(?i:jira)\]").expect("static regex"));

/// Presentation settings shared by every renderable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Issue references are linked to `issue_url` + key when set.
    pub issue_url: Option<String>,
}

impl From<&Config> for RenderOptions {
    fn from(config: &Config) -> Self {
        Self {
            issue_url: config.issue_url.clone(),
        }
    }
}

/// HTML fragment for tooltips and the comment list.
pub trait Renderable {
    fn render_html(&self, options: &RenderOptions) -> String;
}

impl Renderable for Author {
    fn render_html(&self, _options: &RenderOptions) -> String {
        match &self.time {
            Some(time) => format!("By {}, {}", escape_html(&self.name), escape_html(time)),
            None => format!("By {}", escape_html(&self.name)),
        }
    }
}

impl Renderable for Comment {
    fn render_html(&self, options: &RenderOptions) -> String {
        let text = escape_html(&self.text).replace("\r\n", "\n").replace('\n', "<br>");
        match &options.issue_url {
            Some(base) => {
                let base = escape_html(base);
                ISSUE_REF
                    .replace_all(&text, |caps: &regex::Captures<'_>| {
                        format!("<a href='{base}{key}'>Issue {key}</a>", key = &caps[1])
                    })
                    .into_owned()
            }
            None => text,
        }
    }
}

impl Renderable for CommentEntry {
    fn render_html(&self, options: &RenderOptions) -> String {
        format!(
            "<div class='comment'>{}</div><div class='author'>{}</div>",
            self.comment.render_html(options),
            self.author.render_html(options)
        )
    }
}

/// Tests per date, grouped by version within each date.
impl Renderable for Tests {
    fn render_html(&self, _options: &RenderOptions) -> String {
        let mut out = String::new();
        for (date, tests) in self.iter() {
            out.push_str(&format!("<div class='date'>{}", escape_html(date)));
            let mut sorted = tests.to_vec();
            sorted.sort();
            let mut version = None;
            for test in &sorted {
                let this = test.display_version();
                if version.as_ref() != Some(&this) {
                    if version.is_some() {
                        out.push_str("</div>");
                    }
                    out.push_str(&format!("<div class='version'>{}", escape_html(&this)));
                    version = Some(this);
                }
                out.push_str(&format!("<div class='test'>{}</div>", escape_html(&test.name)));
            }
            if version.is_some() {
                out.push_str("</div>");
            }
            out.push_str("</div>");
        }
        out
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
