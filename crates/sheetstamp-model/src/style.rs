use serde::{Deserialize, Serialize};

/// First id available for workbook-defined number formats; lower ids are
/// reserved for the builtin table.
pub const CUSTOM_NUMBER_FORMAT_OFFSET: u16 = 164;

/// Builtin number-format id for the short date format (`m/d/yyyy`).
pub const DATE_NUMBER_FORMAT_ID: u16 = 14;

/// An ARGB color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub argb: u32,
}

impl Color {
    pub const fn new_argb(argb: u32) -> Self {
        Self { argb }
    }

    pub const fn black() -> Self {
        Self { argb: 0xFF000000 }
    }

    pub const fn white() -> Self {
        Self { argb: 0xFFFFFFFF }
    }

    /// Parse `RRGGBB` or `AARRGGBB` hex; six-digit input gets an opaque
    /// alpha channel.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        match hex.len() {
            6 => u32::from_str_radix(hex, 16)
                .ok()
                .map(|rgb| Self { argb: 0xFF000000 | rgb }),
            8 => u32::from_str_radix(hex, 16).ok().map(|argb| Self { argb }),
            _ => None,
        }
    }

    /// The `AARRGGBB` form used by the style part's `rgb` attributes.
    pub fn to_hex(self) -> String {
        format!("{:08X}", self.argb)
    }
}

/// Font formatting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Font {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Font size in 1/100 points (e.g. 1100 = 11pt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_100pt: Option<u16>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Fill pattern kinds (subset).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PatternType {
    #[default]
    None,
    Solid,
    Gray125,
}

impl PatternType {
    pub fn as_attr(self) -> &'static str {
        match self {
            PatternType::None => "none",
            PatternType::Solid => "solid",
            PatternType::Gray125 => "gray125",
        }
    }

    pub fn from_attr(attr: &str) -> Option<Self> {
        Some(match attr {
            "none" => PatternType::None,
            "solid" => PatternType::Solid,
            "gray125" => PatternType::Gray125,
            _ => return None,
        })
    }
}

/// Fill formatting. For a solid fill the visible color is `foreground`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Fill {
    #[serde(default)]
    pub pattern: PatternType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Color>,
}

/// Border line style.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderStyle {
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
    Hair,
}

impl BorderStyle {
    pub fn as_attr(self) -> &'static str {
        match self {
            BorderStyle::Thin => "thin",
            BorderStyle::Medium => "medium",
            BorderStyle::Thick => "thick",
            BorderStyle::Dashed => "dashed",
            BorderStyle::Dotted => "dotted",
            BorderStyle::Double => "double",
            BorderStyle::Hair => "hair",
        }
    }

    pub fn from_attr(attr: &str) -> Option<Self> {
        Some(match attr {
            "thin" => BorderStyle::Thin,
            "medium" => BorderStyle::Medium,
            "thick" => BorderStyle::Thick,
            "dashed" => BorderStyle::Dashed,
            "dotted" => BorderStyle::Dotted,
            "double" => BorderStyle::Double,
            "hair" => BorderStyle::Hair,
            _ => return None,
        })
    }
}

/// One edge of a cell border.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorderEdge {
    pub style: BorderStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Border formatting; absent edges are unbordered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Border {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<BorderEdge>,
}

/// Horizontal alignment options (subset).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    General,
    Left,
    Center,
    Right,
    Justify,
}

impl HorizontalAlignment {
    pub fn as_attr(self) -> &'static str {
        match self {
            HorizontalAlignment::General => "general",
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
            HorizontalAlignment::Justify => "justify",
        }
    }

    pub fn from_attr(attr: &str) -> Option<Self> {
        Some(match attr {
            "general" => HorizontalAlignment::General,
            "left" => HorizontalAlignment::Left,
            "center" => HorizontalAlignment::Center,
            "right" => HorizontalAlignment::Right,
            "justify" => HorizontalAlignment::Justify,
            _ => return None,
        })
    }
}

/// Vertical alignment options (subset).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
}

impl VerticalAlignment {
    pub fn as_attr(self) -> &'static str {
        match self {
            VerticalAlignment::Top => "top",
            VerticalAlignment::Center => "center",
            VerticalAlignment::Bottom => "bottom",
        }
    }

    pub fn from_attr(attr: &str) -> Option<Self> {
        Some(match attr {
            "top" => VerticalAlignment::Top,
            "center" => VerticalAlignment::Center,
            "bottom" => VerticalAlignment::Bottom,
            _ => return None,
        })
    }
}

/// Alignment formatting (subset).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Alignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<HorizontalAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<VerticalAlignment>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub wrap_text: bool,
}

/// A number format: either a builtin id, or a format code that gets a
/// workbook-defined id on interning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NumberFormat {
    pub id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl NumberFormat {
    pub const fn builtin(id: u16) -> Self {
        Self { id, code: None }
    }

    pub fn custom(code: impl Into<String>) -> Self {
        Self {
            id: 0,
            code: Some(code.into()),
        }
    }
}

/// One row of the cell-format table. Ids index the component pools; an
/// absent id is treated as a wildcard during lookup, which is how externally
/// authored style parts with sparse rows keep matching.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CellFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub apply_font: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub apply_fill: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub apply_border: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub apply_number_format: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub apply_alignment: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The workbook's deduplicated style tables: fonts, fills, borders, custom
/// number formats, and the cell-format rows that cells reference by index.
///
/// All interning is append-only linear scan; indices handed out stay valid
/// for the lifetime of the workbook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StylePool {
    pub fonts: Vec<Font>,
    pub fills: Vec<Fill>,
    pub borders: Vec<Border>,
    /// Workbook-defined formats only; builtins are implied by id.
    pub number_formats: Vec<NumberFormat>,
    pub cell_formats: Vec<CellFormat>,
}

impl Default for StylePool {
    fn default() -> Self {
        Self::new()
    }
}

impl StylePool {
    /// A pool with the stock rows every workbook carries: one default font,
    /// the `none` and `gray125` fills, one empty border, and cell format 0.
    pub fn new() -> Self {
        Self {
            fonts: vec![Font {
                name: Some("Calibri".to_string()),
                size_100pt: Some(1100),
                ..Font::default()
            }],
            fills: vec![
                Fill::default(),
                Fill {
                    pattern: PatternType::Gray125,
                    ..Fill::default()
                },
            ],
            borders: vec![Border::default()],
            number_formats: Vec::new(),
            cell_formats: vec![CellFormat {
                font_id: Some(0),
                fill_id: Some(0),
                border_id: Some(0),
                number_format_id: Some(0),
                ..CellFormat::default()
            }],
        }
    }

    pub fn intern_font(&mut self, font: &Font) -> u32 {
        intern(&mut self.fonts, font)
    }

    pub fn intern_fill(&mut self, fill: &Fill) -> u32 {
        intern(&mut self.fills, fill)
    }

    pub fn intern_border(&mut self, border: &Border) -> u32 {
        intern(&mut self.borders, border)
    }

    /// Resolve a number format to its id. Builtin formats pass their id
    /// through; codes are deduplicated against the workbook-defined pool and
    /// new codes get the next free custom id.
    pub fn intern_number_format(&mut self, format: &NumberFormat) -> u16 {
        let Some(code) = &format.code else {
            return format.id;
        };
        if let Some(existing) = self
            .number_formats
            .iter()
            .find(|f| f.code.as_deref() == Some(code.as_str()))
        {
            return existing.id;
        }
        let id = self.next_custom_id();
        self.number_formats.push(NumberFormat {
            id,
            code: Some(code.clone()),
        });
        id
    }

    fn next_custom_id(&self) -> u16 {
        self.number_formats
            .iter()
            .map(|f| f.id.saturating_add(1))
            .max()
            .unwrap_or(0)
            .max(CUSTOM_NUMBER_FORMAT_OFFSET)
    }

    /// Resolve a composed style to a cell-format index, interning each
    /// component and then reusing the first matching row. Rows with absent
    /// component ids match any candidate on that component.
    pub fn lookup_style_index(&mut self, style: &SpreadsheetStyle) -> u32 {
        let font_id = self.intern_font(&style.font);
        let fill_id = self.intern_fill(&style.fill);
        let border_id = self.intern_border(&style.border);
        let number_format_id = self.intern_number_format(&style.number_format);

        let found = self.cell_formats.iter().position(|row| {
            wildcard_eq(row.font_id, font_id)
                && wildcard_eq(row.fill_id, fill_id)
                && wildcard_eq(row.border_id, border_id)
                && wildcard_eq(row.number_format_id, number_format_id)
                && row.alignment == style.alignment
        });
        if let Some(index) = found {
            return index as u32;
        }

        self.cell_formats.push(CellFormat {
            font_id: Some(font_id),
            fill_id: Some(fill_id),
            border_id: Some(border_id),
            number_format_id: Some(number_format_id),
            alignment: style.alignment.clone(),
            apply_font: true,
            apply_fill: fill_id != 0,
            apply_border: border_id != 0,
            apply_number_format: number_format_id != 0,
            apply_alignment: style.alignment.is_some(),
        });
        (self.cell_formats.len() - 1) as u32
    }

    /// A cell-format index that applies only a builtin number format,
    /// reusing any row that already carries it.
    pub fn builtin_style_index(&mut self, num_fmt_id: u16) -> u32 {
        if let Some(index) = self
            .cell_formats
            .iter()
            .position(|row| row.number_format_id == Some(num_fmt_id))
        {
            return index as u32;
        }
        self.cell_formats.push(CellFormat {
            font_id: Some(0),
            fill_id: Some(0),
            border_id: Some(0),
            number_format_id: Some(num_fmt_id),
            apply_number_format: true,
            ..CellFormat::default()
        });
        (self.cell_formats.len() - 1) as u32
    }

    pub fn cell_format(&self, index: u32) -> Option<&CellFormat> {
        self.cell_formats.get(index as usize)
    }

    /// The number-format id a cell-format row renders with.
    pub fn number_format_of(&self, style_index: u32) -> Option<u16> {
        self.cell_format(style_index)?.number_format_id
    }

    pub fn number_format_code(&self, id: u16) -> Option<&str> {
        self.number_formats
            .iter()
            .find(|f| f.id == id)
            .and_then(|f| f.code.as_deref())
    }

    /// Reconstruct the composed style a cell-format row describes.
    pub fn style_at(&self, index: u32) -> Option<SpreadsheetStyle> {
        let row = self.cell_format(index)?;
        let font = row
            .font_id
            .and_then(|id| self.fonts.get(id as usize))
            .cloned()
            .unwrap_or_default();
        let fill = row
            .fill_id
            .and_then(|id| self.fills.get(id as usize))
            .cloned()
            .unwrap_or_default();
        let border = row
            .border_id
            .and_then(|id| self.borders.get(id as usize))
            .cloned()
            .unwrap_or_default();
        let number_format = match row.number_format_id {
            Some(id) => NumberFormat {
                id,
                code: self.number_format_code(id).map(str::to_string),
            },
            None => NumberFormat::default(),
        };
        Some(SpreadsheetStyle {
            font,
            fill,
            border,
            alignment: row.alignment.clone(),
            number_format,
        })
    }
}

fn intern<T: Clone + PartialEq>(pool: &mut Vec<T>, item: &T) -> u32 {
    if let Some(index) = pool.iter().position(|existing| existing == item) {
        return index as u32;
    }
    pool.push(item.clone());
    (pool.len() - 1) as u32
}

fn wildcard_eq<T: PartialEq>(row: Option<T>, candidate: T) -> bool {
    match row {
        Some(v) => v == candidate,
        None => true,
    }
}

/// A composed cell style built fluently and resolved against the pool with
/// [`StylePool::lookup_style_index`].
///
/// ```
/// use sheetstamp_model::{BorderStyle, Color, SpreadsheetStyle};
///
/// let header = SpreadsheetStyle::new()
///     .bold(true)
///     .background(Color::from_hex("DDEBF7").unwrap())
///     .border_bottom(BorderStyle::Medium, None);
/// ```
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct SpreadsheetStyle {
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    pub number_format: NumberFormat,
}

impl SpreadsheetStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn font_name(mut self, name: impl Into<String>) -> Self {
        self.font.name = Some(name.into());
        self
    }

    /// Font size in points; stored in 1/100 point steps.
    pub fn font_size(mut self, points: f64) -> Self {
        self.font.size_100pt = Some((points * 100.0).round() as u16);
        self
    }

    pub fn bold(mut self, bold: bool) -> Self {
        self.font.bold = bold;
        self
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.font.italic = italic;
        self
    }

    pub fn underline(mut self, underline: bool) -> Self {
        self.font.underline = underline;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.font.color = Some(color);
        self
    }

    /// Solid cell background.
    pub fn background(mut self, color: Color) -> Self {
        self.fill = Fill {
            pattern: PatternType::Solid,
            foreground: Some(color),
            background: None,
        };
        self
    }

    pub fn horizontal(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment.get_or_insert_with(Alignment::default).horizontal = Some(alignment);
        self
    }

    pub fn vertical(mut self, alignment: VerticalAlignment) -> Self {
        self.alignment.get_or_insert_with(Alignment::default).vertical = Some(alignment);
        self
    }

    pub fn wrap_text(mut self, wrap: bool) -> Self {
        self.alignment.get_or_insert_with(Alignment::default).wrap_text = wrap;
        self
    }

    pub fn number_format_id(mut self, id: u16) -> Self {
        self.number_format = NumberFormat::builtin(id);
        self
    }

    pub fn number_format_code(mut self, code: impl Into<String>) -> Self {
        self.number_format = NumberFormat::custom(code);
        self
    }

    /// The builtin short date format.
    pub fn date(self) -> Self {
        self.number_format_id(DATE_NUMBER_FORMAT_ID)
    }

    pub fn border_top(mut self, style: BorderStyle, color: Option<Color>) -> Self {
        self.border.top = Some(BorderEdge { style, color });
        self
    }

    pub fn border_bottom(mut self, style: BorderStyle, color: Option<Color>) -> Self {
        self.border.bottom = Some(BorderEdge { style, color });
        self
    }

    pub fn border_left(mut self, style: BorderStyle, color: Option<Color>) -> Self {
        self.border.left = Some(BorderEdge { style, color });
        self
    }

    pub fn border_right(mut self, style: BorderStyle, color: Option<Color>) -> Self {
        self.border.right = Some(BorderEdge { style, color });
        self
    }

    /// All four edges at once.
    pub fn outline(self, style: BorderStyle, color: Option<Color>) -> Self {
        self.border_top(style, color)
            .border_bottom(style, color)
            .border_left(style, color)
            .border_right(style, color)
    }
}
