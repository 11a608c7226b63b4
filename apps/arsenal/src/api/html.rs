//! HTML rendering helpers.
//!
//! Pages are assembled from small string-producing functions. Every value
//! that did not come from a literal in this crate goes through [`escape`].

use super::cookies::{CookieOptions, FLASH_COOKIE};
use super::flash::Flash;
use arsenal_core::listing::{ListParams, Page, SortKey};
use arsenal_core::validate::FormErrors;
use arsenal_core::{Session, User};
use axum::http::{StatusCode, header::SET_COOKIE};
use axum::response::{Html, IntoResponse, Response};

/// Escape text for use in element content and quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// LAYOUT
// =============================================================================

/// Everything around the page body: navigation and the flash banner.
#[derive(Debug, Default)]
pub struct Chrome<'a> {
    pub user: Option<&'a User>,
    pub csrf: Option<&'a str>,
    pub flash: Option<Flash>,
    /// Attributes for the cookie that clears a shown flash.
    pub cookies: CookieOptions,
}

impl<'a> Chrome<'a> {
    pub fn anonymous(cookies: CookieOptions, flash: Option<Flash>) -> Self {
        Self {
            user: None,
            csrf: None,
            flash,
            cookies,
        }
    }

    pub fn signed_in(
        user: &'a User,
        session: &'a Session,
        cookies: CookieOptions,
        flash: Option<Flash>,
    ) -> Self {
        Self {
            user: Some(user),
            csrf: Some(&session.csrf_token),
            flash,
            cookies,
        }
    }
}

fn nav(chrome: &Chrome<'_>) -> String {
    match (chrome.user, chrome.csrf) {
        (Some(user), Some(csrf)) => {
            let admin = if user.has_any_permission() {
                r#"<a href="/admin">Admin</a>"#
            } else {
                ""
            };
            format!(
                r#"<nav><a href="/arsenal">Arsenal</a><a href="/profile">Profile</a><a href="/billing">Plan</a>{admin}<span class="who">{}</span>{}</nav>"#,
                escape(&user.display_name),
                post_button("/logout", "Log out", csrf, "link"),
            )
        }
        _ => r#"<nav><a href="/login">Log in</a><a href="/register">Sign up</a></nav>"#.to_string(),
    }
}

/// Render a full page. Displaying a flash also clears its cookie.
pub fn page(status: StatusCode, title: &str, chrome: Chrome<'_>, body: &str) -> Response {
    let banner = chrome
        .flash
        .as_ref()
        .map(|f| {
            format!(
                r#"<div class="flash flash-{}">{}</div>"#,
                f.level.as_str(),
                escape(&f.message)
            )
        })
        .unwrap_or_default();

    let document = format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · Arsenal</title>
<link rel="stylesheet" href="/static/app.css">
</head>
<body>
<header><a class="brand" href="/">Arsenal</a>{nav}</header>
<main>
{banner}
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
        nav = nav(&chrome),
    );

    let mut response = (status, Html(document)).into_response();
    if chrome.flash.is_some() {
        response
            .headers_mut()
            .append(SET_COOKIE, chrome.cookies.clear(FLASH_COOKIE));
    }
    response
}

// =============================================================================
// FORMS
// =============================================================================

pub fn csrf_field(token: &str) -> String {
    format!(r#"<input type="hidden" name="csrf" value="{}">"#, escape(token))
}

/// A one-button form posting to `action`.
pub fn post_button(action: &str, label: &str, csrf: &str, class: &str) -> String {
    format!(
        r#"<form method="post" action="{}" class="inline">{}<button type="submit" class="{}">{}</button></form>"#,
        escape(action),
        csrf_field(csrf),
        escape(class),
        escape(label)
    )
}

fn field_error(errors: &FormErrors, name: &str) -> String {
    errors
        .get(name)
        .map(|message| format!(r#"<p class="field-error">{}</p>"#, escape(message)))
        .unwrap_or_default()
}

/// Banner listing every problem, shown above a re-rendered form.
pub fn error_summary(errors: &FormErrors) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let count = errors.len();
    let noun = if count == 1 { "problem" } else { "problems" };
    format!(r#"<div class="form-errors">Please fix {count} {noun} below.</div>"#)
}

pub fn input(kind: &str, name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"<label>{label}<input type="{kind}" name="{name}" value="{value}"></label>{error}"#,
        label = escape(label),
        kind = escape(kind),
        name = escape(name),
        value = escape(value),
        error = field_error(errors, name),
    )
}

pub fn textarea(name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"<label>{label}<textarea name="{name}" rows="4">{value}</textarea></label>{error}"#,
        label = escape(label),
        name = escape(name),
        value = escape(value),
        error = field_error(errors, name),
    )
}

pub fn select(
    name: &str,
    label: &str,
    options: &[(&str, &str)],
    selected: &str,
    errors: &FormErrors,
) -> String {
    let options: String = options
        .iter()
        .map(|(value, text)| {
            let mark = if *value == selected { " selected" } else { "" };
            format!(
                r#"<option value="{}"{mark}>{}</option>"#,
                escape(value),
                escape(text)
            )
        })
        .collect();
    format!(
        r#"<label>{label}<select name="{name}">{options}</select></label>{error}"#,
        label = escape(label),
        name = escape(name),
        error = field_error(errors, name),
    )
}

pub fn checkbox(name: &str, value: &str, label: &str, checked: bool) -> String {
    let mark = if checked { " checked" } else { "" };
    format!(
        r#"<label class="check"><input type="checkbox" name="{}" value="{}"{mark}> {}</label>"#,
        escape(name),
        escape(value),
        escape(label)
    )
}

// =============================================================================
// LISTS
// =============================================================================

/// Search box that keeps the current sort.
pub fn search_form<S: SortKey>(base: &str, params: &ListParams<S>) -> String {
    format!(
        r#"<form method="get" action="{base}" class="search"><input type="search" name="q" value="{q}" placeholder="Search"><input type="hidden" name="sort" value="{sort}"><input type="hidden" name="dir" value="{dir}"><button type="submit">Search</button></form>"#,
        base = escape(base),
        q = escape(params.search.as_deref().unwrap_or_default()),
        sort = params.sort.as_str(),
        dir = params.dir.as_str(),
    )
}

/// Column heading that sorts by `key`, marking the active column.
pub fn sort_header<S: SortKey>(base: &str, params: &ListParams<S>, key: S) -> String {
    let marker = if key == params.sort {
        match params.dir {
            arsenal_core::SortDir::Asc => " ▲",
            arsenal_core::SortDir::Desc => " ▼",
        }
    } else {
        ""
    };
    format!(
        r#"<th><a href="{}?{}">{}{marker}</a></th>"#,
        escape(base),
        escape(&params.query_for_sort(key)),
        escape(key.label())
    )
}

/// Previous/next links and a position summary.
pub fn pagination<S: SortKey, T>(base: &str, params: &ListParams<S>, page: &Page<T>) -> String {
    let prev = if page.has_prev() {
        format!(
            r#"<a rel="prev" href="{}?{}">Previous</a>"#,
            escape(base),
            escape(&params.query_for_page(page.page - 1))
        )
    } else {
        String::new()
    };
    let next = if page.has_next() {
        format!(
            r#"<a rel="next" href="{}?{}">Next</a>"#,
            escape(base),
            escape(&params.query_for_page(page.page + 1))
        )
    } else {
        String::new()
    };
    format!(
        r#"<nav class="pagination">{prev}<span>Page {} of {} ({} total)</span>{next}</nav>"#,
        page.page, page.total_pages, page.total
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape(r#"<script>alert("x&y")</script>'"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;&#39;"
        );
    }

    #[test]
    fn input_shows_field_error() {
        let mut errors = FormErrors::new();
        errors.add("email", "Email is required");
        let html = input("email", "email", "Email", "<x>", &errors);
        assert!(html.contains(r#"value="&lt;x&gt;""#));
        assert!(html.contains("Email is required"));
    }

    fn flash_clear_cookie(secure: bool) -> String {
        let response = page(
            StatusCode::OK,
            "Hi",
            Chrome::anonymous(CookieOptions { secure }, Some(Flash::info("hello"))),
            "<p>body</p>",
        );
        response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn flash_page_clears_cookie() {
        let cookie = flash_clear_cookie(false);
        assert!(cookie.starts_with("arsenal_flash=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn flash_clear_cookie_is_secure_when_configured() {
        assert!(flash_clear_cookie(true).ends_with("; Secure"));
    }

    #[test]
    fn page_without_flash_sets_no_cookie() {
        let response = page(StatusCode::OK, "Hi", Chrome::default(), "");
        assert!(response.headers().get(SET_COOKIE).is_none());
    }
}
