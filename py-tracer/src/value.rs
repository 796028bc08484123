//! Runtime values delivered by the host and their display formatting

use std::fmt::{self, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A Python runtime value as seen through a call context's local bindings
///
/// Hosts convert their own object model into this enum. Values with no
/// structural mapping are passed as [`Value::Object`] with the repr the host
/// computed for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Python's `None` singleton.
    None,
    /// Python boolean (`True` or `False`).
    Bool(bool),
    /// Python integer (64-bit signed).
    Int(i64),
    /// Python float (64-bit IEEE 754).
    Float(f64),
    /// Python string (UTF-8).
    Str(String),
    /// Python list.
    List(Vec<Value>),
    /// Python tuple.
    Tuple(Vec<Value>),
    /// Python dictionary, in insertion order.
    Dict(Vec<(Value, Value)>),
    /// Python set.
    Set(Vec<Value>),
    /// A user-defined function, by name.
    Function(String),
    /// An imported module, by name.
    Module(String),
    /// Any other object, with its type name and host-computed repr.
    Object { type_name: String, repr: String },
}

impl Value {
    /// Whether this value is a function (never shown in the tutor)
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Whether this value is a module (never shown in the tutor)
    pub fn is_module(&self) -> bool {
        matches!(self, Self::Module(_))
    }

    /// Python `repr()` of this value
    pub fn py_repr(&self) -> String {
        let mut s = String::new();
        // Writing into a String cannot fail.
        let _ = self.repr_fmt(&mut s);
        s
    }

    fn repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => float_repr_fmt(*v, f),
            Self::Str(s) => string_repr_fmt(s, f),
            Self::List(items) => {
                f.write_char('[')?;
                sequence_repr_fmt(items, f)?;
                f.write_char(']')
            }
            Self::Tuple(items) => {
                f.write_char('(')?;
                sequence_repr_fmt(items, f)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::Dict(pairs) => {
                f.write_char('{')?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.repr_fmt(f)?;
                    f.write_str(": ")?;
                    v.repr_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Set(items) if items.is_empty() => f.write_str("set()"),
            Self::Set(items) => {
                f.write_char('{')?;
                sequence_repr_fmt(items, f)?;
                f.write_char('}')
            }
            Self::Function(name) => write!(f, "<function {name}>"),
            Self::Module(name) => write!(f, "<module '{name}'>"),
            Self::Object { repr, .. } => f.write_str(repr),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.repr_fmt(f)
    }
}

fn sequence_repr_fmt(items: &[Value], f: &mut impl Write) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.repr_fmt(f)?;
    }
    Ok(())
}

fn float_repr_fmt(v: f64, f: &mut impl Write) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("nan");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
    }
    // Shortest round-trip digits; exponent form outside 1e-4 <= |v| < 1e16.
    let sci = format!("{v:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if v != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return write!(f, "{mantissa}e{sign}{:02}", exponent.abs());
    }
    let s = v.to_string();
    f.write_str(&s)?;
    if !s.contains('.') {
        f.write_str(".0")?;
    }
    Ok(())
}

/// Python string repr: single quotes unless the text contains only single quotes
fn string_repr_fmt(s: &str, f: &mut impl Write) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    f.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\'' if quote == '\'' => f.write_str("\\'")?,
            c if c.is_control() => match u32::from(c) {
                n @ 0..=0xff => write!(f, "\\x{n:02x}")?,
                n @ 0x100..=0xffff => write!(f, "\\u{n:04x}")?,
                n => write!(f, "\\U{n:08x}")?,
            },
            _ => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

/// Image detection service
///
/// Returns an HTML fragment for values that should be shown as a picture.
pub trait ImageRenderer {
    fn to_html_or_none(&self, value: &Value) -> Option<String>;
}

/// Renderer that never recognizes an image
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImages;

impl ImageRenderer for NoImages {
    fn to_html_or_none(&self, _value: &Value) -> Option<String> {
        None
    }
}

/// Renders lists of pixel rows as inline SVG images
///
/// A value is an image when it is a non-empty list of equally long, non-empty
/// rows whose cells are `[r, g, b]` lists or `(r, g, b)` tuples of integers in
/// `0..=255`. The image is displayed with its width clamped to
/// `min_width..=max_width` and its height scaled to keep the aspect ratio.
#[derive(Debug, Clone)]
pub struct RgbImageRenderer {
    pub min_width: usize,
    pub max_width: usize,
}

impl RgbImageRenderer {
    pub fn new(min_width: usize, max_width: usize) -> Self {
        Self { min_width, max_width }
    }
}

impl Default for RgbImageRenderer {
    fn default() -> Self {
        Self::new(60, 150)
    }
}

impl ImageRenderer for RgbImageRenderer {
    fn to_html_or_none(&self, value: &Value) -> Option<String> {
        let pixels = rgb_rows(value)?;
        let height = pixels.len();
        let width = pixels[0].len();

        let display_width = width.clamp(self.min_width, self.max_width.max(self.min_width));
        let display_height = height * display_width / width;

        let rects: String = pixels
            .iter()
            .enumerate()
            .flat_map(|(y, row)| {
                row.iter().enumerate().map(move |(x, [r, g, b])| {
                    format!("<rect x='{x}' y='{y}' width='1' height='1' fill='#{r:02x}{g:02x}{b:02x}'/>")
                })
            })
            .collect();
        let svg = format!(
            "<svg xmlns='http://www.w3.org/2000/svg' width='{display_width}' height='{display_height}' \
             viewBox='0 0 {width} {height}' shape-rendering='crispEdges'>{rects}</svg>"
        );

        let encoded = STANDARD.encode(svg.as_bytes());
        Some(format!("<img src='data:image/svg+xml;base64,{encoded}'>"))
    }
}

/// Pixel rows of an image-shaped value
fn rgb_rows(value: &Value) -> Option<Vec<Vec<[u8; 3]>>> {
    let Value::List(rows) = value else {
        return None;
    };
    let Value::List(first_row) = rows.first()? else {
        return None;
    };
    let width = first_row.len();
    if width == 0 {
        return None;
    }

    rows.iter()
        .map(|row| match row {
            Value::List(cells) if cells.len() == width => cells.iter().map(rgb_cell).collect::<Option<Vec<_>>>(),
            _ => None,
        })
        .collect()
}

fn rgb_cell(cell: &Value) -> Option<[u8; 3]> {
    let (Value::List(channels) | Value::Tuple(channels)) = cell else {
        return None;
    };
    match channels.as_slice() {
        [Value::Int(r), Value::Int(g), Value::Int(b)] => {
            Some([u8::try_from(*r).ok()?, u8::try_from(*g).ok()?, u8::try_from(*b).ok()?])
        }
        _ => None,
    }
}

/// Turns runtime values into the strings stored in trace snapshots
pub struct ValueFormatter {
    images: Box<dyn ImageRenderer>,
}

impl ValueFormatter {
    pub fn new(images: impl ImageRenderer + 'static) -> Self {
        Self {
            images: Box::new(images),
        }
    }

    /// Display string for `value`, or `None` when the binding must be left out
    ///
    /// Functions and modules are left out. Images become a fenced HTML block;
    /// everything else is shown as its repr.
    pub fn format(&self, value: &Value) -> Option<String> {
        if value.is_callable() || value.is_module() {
            return None;
        }
        match self.images.to_html_or_none(value) {
            Some(html) => Some(format!("```html\n{html}\n```")),
            None => Some(value.py_repr()),
        }
    }
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self::new(RgbImageRenderer::default())
    }
}
