//! Configuration types for MHTML-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Print layout lives in its own
//! serialisable [`PrintOptions`] so it can be logged or embedded in a batch
//! report without dragging the callback along.

use crate::error::ConversionError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for an MHTML-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use confluence_doc2pdf::{ConversionConfig, Margins, PageFormat};
///
/// let config = ConversionConfig::builder()
///     .page_format(PageFormat::Letter)
///     .margins(Margins::uniform(12.0))
///     .render_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Page layout handed to the render driver.
    pub print: PrintOptions,

    /// Seconds the browser may take to print one document. Default: 60.
    ///
    /// Confluence pages with hundreds of inlined screenshots can take a while
    /// to lay out; the process is killed once this budget is spent.
    pub render_timeout_secs: u64,

    /// Explicit browser executable. If None, `chrome-auto` discovers one.
    pub chrome_path: Option<PathBuf>,

    /// Pass `--no-sandbox` to the browser. Default: false.
    ///
    /// Required when running as root inside most containers.
    pub no_sandbox: bool,

    /// File extensions (lowercase, without dot) treated as MHTML input.
    /// Default: `doc`, `mhtml`, `mht`.
    pub extensions: Vec<String>,

    /// Descend into sub-directories in batch mode. Default: true.
    pub recursive: bool,

    /// Skip jobs whose output already exists and is a valid PDF. Default: false.
    pub skip_existing: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-file progress events (batch mode).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            print: PrintOptions::default(),
            render_timeout_secs: 60,
            chrome_path: None,
            no_sandbox: false,
            extensions: vec!["doc".into(), "mhtml".into(), "mht".into()],
            recursive: true,
            skip_existing: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("print", &self.print)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("chrome_path", &self.chrome_path)
            .field("no_sandbox", &self.no_sandbox)
            .field("extensions", &self.extensions)
            .field("recursive", &self.recursive)
            .field("skip_existing", &self.skip_existing)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// True if `path` carries one of the configured MHTML extensions.
    pub fn accepts(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn print_options(mut self, print: PrintOptions) -> Self {
        self.config.print = print;
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.config.print.page_format = format;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.print.margins = margins;
        self
    }

    pub fn print_background(mut self, v: bool) -> Self {
        self.config.print.print_background = v;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn no_sandbox(mut self, v: bool) -> Self {
        self.config.no_sandbox = v;
        self
    }

    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn skip_existing(mut self, v: bool) -> Self {
        self.config.skip_existing = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConversionError> {
        let c = &self.config;
        if c.render_timeout_secs == 0 {
            return Err(ConversionError::InvalidConfig(
                "Render timeout must be ≥ 1 second".into(),
            ));
        }
        if c.extensions.is_empty() {
            return Err(ConversionError::InvalidConfig(
                "At least one input extension is required".into(),
            ));
        }
        c.print.validate()?;
        Ok(self.config)
    }
}

// ── Print options ────────────────────────────────────────────────────────

/// Page layout applied by the render driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintOptions {
    /// Paper size. Default: A4.
    pub page_format: PageFormat,
    /// Per-side spacing. Default: 0 mm on every side.
    pub margins: Margins,
    /// Render CSS backgrounds and colours. Default: true.
    ///
    /// Confluence panels, table header shading and status lozenges are all
    /// backgrounds; without this they print as plain text.
    pub print_background: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            page_format: PageFormat::A4,
            margins: Margins::default(),
            print_background: true,
        }
    }
}

impl PrintOptions {
    fn validate(&self) -> Result<(), ConversionError> {
        let (w, h) = self.page_format.size_mm();
        if !(w > 0.0 && h > 0.0) {
            return Err(ConversionError::InvalidConfig(format!(
                "Page size must be positive, got {w}×{h} mm"
            )));
        }
        let m = &self.margins;
        for (side, v) in [("top", m.top), ("right", m.right), ("bottom", m.bottom), ("left", m.left)] {
            if !(v >= 0.0) {
                return Err(ConversionError::InvalidConfig(format!(
                    "Margin '{side}' must be ≥ 0 mm, got {v}"
                )));
            }
        }
        if m.left + m.right >= w || m.top + m.bottom >= h {
            return Err(ConversionError::InvalidConfig(
                "Margins leave no printable area".into(),
            ));
        }
        Ok(())
    }
}

/// Paper size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    /// 210 × 297 mm (default).
    #[default]
    A4,
    /// 297 × 420 mm.
    A3,
    /// 148 × 210 mm.
    A5,
    /// 8.5 × 11 in.
    Letter,
    /// 8.5 × 14 in.
    Legal,
    /// 11 × 17 in.
    Tabloid,
    /// Arbitrary width × height in millimetres.
    Custom { width_mm: f32, height_mm: f32 },
}

impl PageFormat {
    /// Width and height in millimetres (portrait).
    pub fn size_mm(&self) -> (f32, f32) {
        match *self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
            PageFormat::Tabloid => (279.4, 431.8),
            PageFormat::Custom { width_mm, height_mm } => (width_mm, height_mm),
        }
    }

    /// CSS `size` value for an `@page` rule.
    pub fn css_size(&self) -> String {
        match self {
            PageFormat::A4 => "A4".into(),
            PageFormat::A3 => "A3".into(),
            PageFormat::A5 => "A5".into(),
            PageFormat::Letter => "letter".into(),
            PageFormat::Legal => "legal".into(),
            PageFormat::Tabloid => "11in 17in".into(),
            PageFormat::Custom { width_mm, height_mm } => format!("{width_mm}mm {height_mm}mm"),
        }
    }
}

impl FromStr for PageFormat {
    type Err = ConversionError;

    /// Parses `a4`, `letter`, … or a custom `WIDTHxHEIGHT` in millimetres.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "a4" => Ok(PageFormat::A4),
            "a3" => Ok(PageFormat::A3),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            "tabloid" => Ok(PageFormat::Tabloid),
            custom => {
                let parsed = custom.split_once('x').and_then(|(w, h)| {
                    let w = w.trim().trim_end_matches("mm").parse::<f32>().ok()?;
                    let h = h.trim().trim_end_matches("mm").parse::<f32>().ok()?;
                    Some(PageFormat::Custom {
                        width_mm: w,
                        height_mm: h,
                    })
                });
                parsed.ok_or_else(|| {
                    ConversionError::InvalidConfig(format!(
                        "Unknown page format '{custom}' (use a4, a3, a5, letter, legal, tabloid or WxH in mm)"
                    ))
                })
            }
        }
    }
}

/// Per-side page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    /// The same margin on every side.
    pub fn uniform(mm: f32) -> Self {
        Self {
            top: mm,
            right: mm,
            bottom: mm,
            left: mm,
        }
    }

    /// CSS `margin` shorthand (top right bottom left).
    pub fn css(&self) -> String {
        format!(
            "{}mm {}mm {}mm {}mm",
            self.top, self.right, self.bottom, self.left
        )
    }
}

impl FromStr for Margins {
    type Err = ConversionError;

    /// Parses CSS-style shorthand: `10`, `10,15`, or `10,15,10,15` (mm).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<f32> = s
            .split([',', ' '])
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.trim().trim_end_matches("mm").parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| ConversionError::InvalidConfig(format!("Invalid margins '{s}'")))?;

        match values.as_slice() {
            [all] => Ok(Margins::uniform(*all)),
            [vertical, horizontal] => Ok(Margins {
                top: *vertical,
                right: *horizontal,
                bottom: *vertical,
                left: *horizontal,
            }),
            [top, right, bottom, left] => Ok(Margins {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            _ => Err(ConversionError::InvalidConfig(format!(
                "Margins need 1, 2 or 4 values, got '{s}'"
            ))),
        }
    }
}
