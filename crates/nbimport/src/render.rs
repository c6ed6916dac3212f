//! Rich output for cells that run in-process.
//!
//! The [`Render`] trait lets a value describe itself under several MIME
//! types. [`display`] publishes the resulting bundle to the innermost capture
//! scope, where it becomes a `display_data` output of the running cell.
//! Outside of any scope the `text/plain` form is printed instead.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nbimport_core::execute::MimeBundle;
use nbimport_core::execute::capture::publish_display;
use serde::Serialize;
use serde_json::{Map, Value};

/// Binary or markup image data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutput {
    /// MIME type (e.g., "image/png", "image/svg+xml")
    pub mime_type: String,
    /// Raw image data
    pub data: Vec<u8>,
}

impl ImageOutput {
    pub fn png(data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    pub fn jpeg(data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data: data.into(),
        }
    }

    pub fn svg(markup: impl Into<String>) -> Self {
        Self {
            mime_type: "image/svg+xml".to_string(),
            data: markup.into().into_bytes(),
        }
    }

    /// nbformat keeps SVG as text and base64-encodes everything else.
    fn bundle_value(&self) -> Value {
        if self.mime_type.ends_with("+xml") {
            Value::String(String::from_utf8_lossy(&self.data).into_owned())
        } else {
            Value::String(STANDARD.encode(&self.data))
        }
    }
}

/// Types that can render rich output in a notebook.
///
/// Only [`render_text`](Render::render_text) is required. Every other
/// representation is optional and ends up next to the text in the
/// [`MimeBundle`] built by [`to_mime_bundle`](Render::to_mime_bundle).
///
/// # Example
///
/// ```rust
/// use nbimport::render::Render;
///
/// struct Chart {
///     points: Vec<f64>,
/// }
///
/// impl Render for Chart {
///     fn render_text(&self) -> String {
///         format!("Chart with {} points", self.points.len())
///     }
///
///     fn render_html(&self) -> Option<String> {
///         Some(format!("<div class='chart'>{:?}</div>", self.points))
///     }
/// }
///
/// let bundle = Chart { points: vec![1.0, 2.0] }.to_mime_bundle();
/// assert_eq!(bundle.plain_text(), Some("Chart with 2 points"));
/// ```
pub trait Render {
    /// Plain text representation (`text/plain`).
    fn render_text(&self) -> String;

    /// HTML representation (`text/html`).
    fn render_html(&self) -> Option<String> {
        None
    }

    /// Markdown representation (`text/markdown`).
    fn render_markdown(&self) -> Option<String> {
        None
    }

    /// Image output (PNG, SVG, etc.).
    fn render_image(&self) -> Option<ImageOutput> {
        None
    }

    /// Structured data (`application/json`).
    fn render_data(&self) -> Option<Value> {
        None
    }

    /// All representations keyed by MIME type.
    fn to_mime_bundle(&self) -> MimeBundle {
        let mut bundle = MimeBundle::text(self.render_text());
        if let Some(html) = self.render_html() {
            bundle.insert("text/html", Value::String(html));
        }
        if let Some(markdown) = self.render_markdown() {
            bundle.insert("text/markdown", Value::String(markdown));
        }
        if let Some(image) = self.render_image() {
            bundle.insert(image.mime_type.clone(), image.bundle_value());
        }
        if let Some(data) = self.render_data() {
            bundle.insert("application/json", data);
        }
        bundle
    }
}

/// Publish `value` as display data of the running cell.
pub fn display<T: Render + ?Sized>(value: &T) {
    publish_display(value.to_mime_bundle(), Map::new());
}

pub fn display_html(html: impl Into<String>) {
    display(&Html(html.into()));
}

pub fn display_markdown(markdown: impl Into<String>) {
    display(&Markdown(markdown.into()));
}

pub fn display_image(image: ImageOutput) {
    display(&image);
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl<T: Render + ?Sized> Render for &T {
    fn render_text(&self) -> String {
        (**self).render_text()
    }

    fn render_html(&self) -> Option<String> {
        (**self).render_html()
    }

    fn render_markdown(&self) -> Option<String> {
        (**self).render_markdown()
    }

    fn render_image(&self) -> Option<ImageOutput> {
        (**self).render_image()
    }

    fn render_data(&self) -> Option<Value> {
        (**self).render_data()
    }
}

impl Render for str {
    fn render_text(&self) -> String {
        self.to_string()
    }
}

impl Render for String {
    fn render_text(&self) -> String {
        self.clone()
    }
}

macro_rules! render_via_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Render for $ty {
                fn render_text(&self) -> String {
                    self.to_string()
                }

                fn render_data(&self) -> Option<Value> {
                    serde_json::to_value(self).ok()
                }
            }
        )*
    };
}

render_via_display!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char,
);

impl<T: Render> Render for [T] {
    fn render_text(&self) -> String {
        let items: Vec<String> = self.iter().map(Render::render_text).collect();
        format!("[{}]", items.join(", "))
    }

    fn render_html(&self) -> Option<String> {
        Some(format!(
            "<ul>{}</ul>",
            self.iter()
                .map(|item| {
                    let html = item
                        .render_html()
                        .unwrap_or_else(|| html_escape(&item.render_text()));
                    format!("<li>{html}</li>")
                })
                .collect::<String>()
        ))
    }
}

impl<T: Render> Render for Vec<T> {
    fn render_text(&self) -> String {
        self.as_slice().render_text()
    }

    fn render_html(&self) -> Option<String> {
        self.as_slice().render_html()
    }
}

impl<T: Render> Render for Option<T> {
    fn render_text(&self) -> String {
        match self {
            Some(v) => v.render_text(),
            None => "None".to_string(),
        }
    }

    fn render_html(&self) -> Option<String> {
        self.as_ref().and_then(Render::render_html)
    }

    fn render_image(&self) -> Option<ImageOutput> {
        self.as_ref().and_then(Render::render_image)
    }
}

impl<T: Render, E: std::fmt::Debug> Render for Result<T, E> {
    fn render_text(&self) -> String {
        match self {
            Ok(v) => v.render_text(),
            Err(e) => format!("Error: {:?}", e),
        }
    }

    fn render_html(&self) -> Option<String> {
        self.as_ref().ok().and_then(Render::render_html)
    }
}

impl Render for Value {
    fn render_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_string())
    }

    fn render_data(&self) -> Option<Value> {
        Some(self.clone())
    }
}

impl Render for ImageOutput {
    fn render_text(&self) -> String {
        format!("<{} image, {} bytes>", self.mime_type, self.data.len())
    }

    fn render_image(&self) -> Option<ImageOutput> {
        Some(self.clone())
    }
}

/// Raw HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Html(pub String);

impl Render for Html {
    fn render_text(&self) -> String {
        self.0.clone()
    }

    fn render_html(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Markdown text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markdown(pub String);

impl Render for Markdown {
    fn render_text(&self) -> String {
        self.0.clone()
    }

    fn render_markdown(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Convenience wrapper for types that implement Serialize.
///
/// Wrapping a value in `Json` renders it as formatted JSON and attaches the
/// value itself as `application/json`.
#[derive(Debug, Clone)]
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> Render for Json<T> {
    fn render_text(&self) -> String {
        serde_json::to_string_pretty(&self.0)
            .unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }

    fn render_html(&self) -> Option<String> {
        let pretty = serde_json::to_string_pretty(&self.0).ok()?;
        Some(format!(
            "<pre><code class=\"language-json\">{}</code></pre>",
            html_escape(&pretty)
        ))
    }

    fn render_data(&self) -> Option<Value> {
        serde_json::to_value(&self.0).ok()
    }
}
