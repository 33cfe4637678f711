//! # HTML Rendering
//!
//! Small builders for the server-rendered pages. Every builder returns a
//! `String` of markup; text coming from records or requests must pass
//! through [`escape`] first. Builders that take `cells` or `inner` expect
//! markup that is already escaped.

use axum::response::Html;
use sis_core::validation::NON_FIELD;
use sis_core::{FormErrors, Role, User};

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

/// Escaped text, or `-` when blank.
pub fn or_dash(raw: &str) -> String {
    if raw.trim().is_empty() {
        "-".to_string()
    } else {
        escape(raw)
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

fn nav(user: &User) -> String {
    let mut links: Vec<(&str, &str)> = vec![("/dashboard/", "Dashboard")];
    if user.is_admin() {
        links.extend([
            ("/adminportal/lecturers/", "Lecturers"),
            ("/adminportal/students/", "Students"),
            ("/adminportal/staff/", "Staff"),
            ("/adminportal/courses/", "Courses"),
            ("/adminportal/departments/", "Departments"),
            ("/adminportal/fees/", "Fees"),
        ]);
    } else if user.role == Role::Lecturer {
        links.extend([
            ("/lecturer/attendance/", "Take Attendance"),
            ("/lecturer/attendance/history/", "Attendance History"),
            ("/lecturer/send-message/", "Send Message"),
        ]);
    } else {
        links.extend([
            ("/student/class-overview/", "My Class"),
            ("/student/subjects/", "Subjects"),
            ("/student/attendance/", "Attendance"),
            ("/student/achievements/", "Achievements"),
            ("/student/disciplinary/", "Disciplinary"),
        ]);
    }
    links.extend([
        ("/notifications/", "Notifications"),
        ("/dashboard/profile/", "Profile"),
    ]);

    let mut out = String::from("<nav>");
    for (href, text) in links {
        out.push_str(&link(href, text));
        out.push(' ');
    }
    out.push_str(&post_button("/accounts/logout/", "Logout"));
    out.push_str(&format!(
        "<span class=\"who\">{}</span></nav>",
        escape(user.display_name())
    ));
    out
}

/// A complete document. `messages` are one-shot notices shown above the body.
pub fn page(title: &str, user: Option<&User>, messages: &[String], body: &str) -> Html<String> {
    let mut out = String::from("<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">");
    out.push_str(&format!("<title>{} | SIS</title></head><body>", escape(title)));
    if let Some(user) = user {
        out.push_str(&nav(user));
    }
    for message in messages {
        out.push_str(&format!("<p class=\"message\">{}</p>", escape(message)));
    }
    out.push_str(&format!("<h1>{}</h1>", escape(title)));
    out.push_str(body);
    out.push_str("</body></html>");
    Html(out)
}

// =============================================================================
// BUILDING BLOCKS
// =============================================================================

pub fn link(href: &str, text: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape(href), escape(text))
}

pub fn heading(text: &str) -> String {
    format!("<h2>{}</h2>", escape(text))
}

pub fn paragraph(text: &str) -> String {
    format!("<p>{}</p>", escape(text))
}

/// Label / value pairs as a definition list. Values are escaped here.
pub fn details(pairs: &[(&str, String)]) -> String {
    let mut out = String::from("<dl>");
    for (label, value) in pairs {
        out.push_str(&format!("<dt>{}</dt><dd>{}</dd>", escape(label), or_dash(value)));
    }
    out.push_str("</dl>");
    out
}

/// A table with escaped headers and pre-rendered cells.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return "<p class=\"empty\">Nothing to show.</p>".to_string();
    }
    let mut out = String::from("<table><thead><tr>");
    for header in headers {
        out.push_str(&format!("<th>{}</th>", escape(header)));
    }
    out.push_str("</tr></thead><tbody>");
    for row in rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", cell));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}

// =============================================================================
// FORMS
// =============================================================================

fn field_errors(errors: &FormErrors, name: &str) -> String {
    errors
        .field(name)
        .iter()
        .map(|e| format!("<span class=\"field-error\">{}</span>", escape(e)))
        .collect()
}

/// Errors that belong to no single field.
pub fn form_errors(errors: &FormErrors) -> String {
    let mut out = String::new();
    for message in errors.field(NON_FIELD).iter().chain(errors.general()) {
        out.push_str(&format!("<p class=\"error\">{}</p>", escape(message)));
    }
    out
}

/// A POST form around pre-rendered fields.
pub fn form(action: &str, errors: &FormErrors, inner: &str, submit: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{}\">{}{}<button type=\"submit\">{}</button></form>",
        escape(action),
        form_errors(errors),
        inner,
        escape(submit)
    )
}

/// A GET form, used for filters.
pub fn filter_form(action: &str, inner: &str) -> String {
    format!(
        "<form method=\"get\" action=\"{}\">{}<button type=\"submit\">Filter</button></form>",
        escape(action),
        inner
    )
}

/// A form consisting of a single submit button.
pub fn post_button(action: &str, label: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{}\" class=\"inline\">\
         <button type=\"submit\">{}</button></form>",
        escape(action),
        escape(label)
    )
}

pub fn input(kind: &str, name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        "<p><label for=\"{n}\">{l}</label>\
         <input type=\"{k}\" id=\"{n}\" name=\"{n}\" value=\"{v}\">{e}</p>",
        n = escape(name),
        l = escape(label),
        k = escape(kind),
        v = escape(value),
        e = field_errors(errors, name)
    )
}

pub fn text(name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    input("text", name, label, value, errors)
}

pub fn textarea(name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        "<p><label for=\"{n}\">{l}</label><textarea id=\"{n}\" name=\"{n}\">{v}</textarea>{e}</p>",
        n = escape(name),
        l = escape(label),
        v = escape(value),
        e = field_errors(errors, name)
    )
}

pub fn checkbox(name: &str, label: &str, checked: bool) -> String {
    format!(
        "<p><label><input type=\"checkbox\" name=\"{}\" value=\"on\"{}> {}</label></p>",
        escape(name),
        if checked { " checked" } else { "" },
        escape(label)
    )
}

/// A select box over `(value, label)` options with an empty first choice.
pub fn select(
    name: &str,
    label: &str,
    options: &[(String, String)],
    selected: &str,
    errors: &FormErrors,
) -> String {
    let mut out = format!(
        "<p><label for=\"{n}\">{l}</label><select id=\"{n}\" name=\"{n}\">\
         <option value=\"\">---------</option>",
        n = escape(name),
        l = escape(label)
    );
    for (value, text) in options {
        out.push_str(&format!(
            "<option value=\"{}\"{}>{}</option>",
            escape(value),
            if value == selected { " selected" } else { "" },
            escape(text)
        ));
    }
    out.push_str("</select>");
    out.push_str(&field_errors(errors, name));
    out.push_str("</p>");
    out
}

/// Options for a choice enum, in declaration order.
pub fn choices<T: Copy>(
    all: &[T],
    code: fn(T) -> &'static str,
    label: fn(T) -> &'static str,
) -> Vec<(String, String)> {
    all.iter()
        .map(|c| (code(*c).to_string(), label(*c).to_string()))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<b>\"Tom\" & 'Jerry'</b>"),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(or_dash("  "), "-");
    }

    #[test]
    fn test_select_marks_selected_option() {
        let options = vec![
            ("1".to_string(), "Science".to_string()),
            ("2".to_string(), "Arts".to_string()),
        ];
        let markup = select("department", "Department", &options, "2", &FormErrors::new());
        assert!(markup.contains("<option value=\"2\" selected>Arts</option>"));
        assert!(markup.contains("<option value=\"1\">Science</option>"));
    }

    #[test]
    fn test_field_errors_are_rendered() {
        let mut errors = FormErrors::new();
        errors.add("email", "Enter a valid email address.");
        let markup = text("email", "Email", "x", &errors);
        assert!(markup.contains("Enter a valid email address."));
    }

    #[test]
    fn test_empty_table() {
        assert!(table(&["Name"], &[]).contains("Nothing to show."));
    }
}
