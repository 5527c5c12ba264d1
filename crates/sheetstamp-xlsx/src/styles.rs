//! `xl/styles.xml` ⇄ [`StylePool`]. The pool mirrors the part's tables
//! one-to-one, so cell `s` attributes and pool indices coincide.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use sheetstamp_model::{
    Alignment, Border, BorderEdge, BorderStyle, CellFormat, Color, Fill, Font,
    HorizontalAlignment, NumberFormat, PatternType, StylePool, VerticalAlignment,
};

use crate::opc::escape_attr;
use crate::package::XlsxError;

pub(crate) fn parse_xml_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[derive(Copy, Clone, PartialEq)]
enum Section {
    None,
    Fonts,
    Fills,
    Borders,
    CellXfs,
}

#[derive(Copy, Clone, PartialEq)]
enum EdgeSlot {
    Left,
    Right,
    Top,
    Bottom,
}

pub fn parse_styles(xml: &[u8]) -> Result<StylePool, XlsxError> {
    let mut pool = StylePool {
        fonts: Vec::new(),
        fills: Vec::new(),
        borders: Vec::new(),
        number_formats: Vec::new(),
        cell_formats: Vec::new(),
    };

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut section = Section::None;
    let mut font: Option<Font> = None;
    let mut fill: Option<Fill> = None;
    let mut border: Option<Border> = None;
    let mut edge: Option<(EdgeSlot, Option<BorderStyle>, Option<Color>)> = None;
    let mut xf: Option<CellFormat> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"fonts" => section = Section::Fonts,
                    b"fills" => section = Section::Fills,
                    b"borders" => section = Section::Borders,
                    b"cellXfs" => section = Section::CellXfs,
                    b"numFmt" => {
                        let mut id = 0u16;
                        let mut code = None;
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"numFmtId" => id = value.parse().unwrap_or(0),
                                b"formatCode" => code = Some(value.into_owned()),
                                _ => {}
                            }
                        }
                        pool.number_formats.push(NumberFormat { id, code });
                    }
                    b"font" if section == Section::Fonts => {
                        font = Some(Font::default());
                        if empty {
                            pool.fonts.push(font.take().unwrap_or_default());
                        }
                    }
                    b"sz" if font.is_some() => {
                        if let Some(value) = attr_value(e, b"val")? {
                            if let (Some(font), Ok(points)) = (font.as_mut(), value.parse::<f64>())
                            {
                                font.size_100pt = Some((points * 100.0).round() as u16);
                            }
                        }
                    }
                    b"name" if font.is_some() => {
                        if let (Some(font), Some(value)) = (font.as_mut(), attr_value(e, b"val")?) {
                            font.name = Some(value);
                        }
                    }
                    b"b" if font.is_some() => set_font_flag(&mut font, e, |f, v| f.bold = v)?,
                    b"i" if font.is_some() => set_font_flag(&mut font, e, |f, v| f.italic = v)?,
                    b"u" if font.is_some() => {
                        set_font_flag(&mut font, e, |f, v| f.underline = v)?
                    }
                    b"color" => {
                        let color = attr_value(e, b"rgb")?.and_then(|v| Color::from_hex(&v));
                        if let Some((_, _, edge_color)) = edge.as_mut() {
                            *edge_color = color;
                        } else if let Some(font) = font.as_mut() {
                            font.color = color;
                        }
                    }
                    b"fill" if section == Section::Fills => {
                        fill = Some(Fill::default());
                        if empty {
                            pool.fills.push(fill.take().unwrap_or_default());
                        }
                    }
                    b"patternFill" => {
                        if let Some(fill) = fill.as_mut() {
                            if let Some(value) = attr_value(e, b"patternType")? {
                                fill.pattern =
                                    PatternType::from_attr(&value).unwrap_or_default();
                            }
                        }
                    }
                    b"fgColor" => {
                        if let Some(fill) = fill.as_mut() {
                            fill.foreground =
                                attr_value(e, b"rgb")?.and_then(|v| Color::from_hex(&v));
                        }
                    }
                    b"bgColor" => {
                        if let Some(fill) = fill.as_mut() {
                            fill.background =
                                attr_value(e, b"rgb")?.and_then(|v| Color::from_hex(&v));
                        }
                    }
                    b"border" if section == Section::Borders => {
                        border = Some(Border::default());
                        if empty {
                            pool.borders.push(border.take().unwrap_or_default());
                        }
                    }
                    name @ (b"left" | b"right" | b"top" | b"bottom") if border.is_some() => {
                        let slot = match name {
                            b"left" => EdgeSlot::Left,
                            b"right" => EdgeSlot::Right,
                            b"top" => EdgeSlot::Top,
                            _ => EdgeSlot::Bottom,
                        };
                        let style =
                            attr_value(e, b"style")?.and_then(|v| BorderStyle::from_attr(&v));
                        if empty {
                            commit_edge(&mut border, (slot, style, None));
                        } else {
                            edge = Some((slot, style, None));
                        }
                    }
                    b"xf" if section == Section::CellXfs => {
                        let mut row = CellFormat::default();
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"numFmtId" => row.number_format_id = value.parse().ok(),
                                b"fontId" => row.font_id = value.parse().ok(),
                                b"fillId" => row.fill_id = value.parse().ok(),
                                b"borderId" => row.border_id = value.parse().ok(),
                                b"applyFont" => row.apply_font = parse_xml_bool(&value),
                                b"applyFill" => row.apply_fill = parse_xml_bool(&value),
                                b"applyBorder" => row.apply_border = parse_xml_bool(&value),
                                b"applyNumberFormat" => {
                                    row.apply_number_format = parse_xml_bool(&value)
                                }
                                b"applyAlignment" => row.apply_alignment = parse_xml_bool(&value),
                                _ => {}
                            }
                        }
                        if empty {
                            pool.cell_formats.push(row);
                        } else {
                            xf = Some(row);
                        }
                    }
                    b"alignment" if xf.is_some() => {
                        let mut alignment = Alignment::default();
                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = attr.unescape_value()?;
                            match attr.key.as_ref() {
                                b"horizontal" => {
                                    alignment.horizontal = HorizontalAlignment::from_attr(&value)
                                }
                                b"vertical" => {
                                    alignment.vertical = VerticalAlignment::from_attr(&value)
                                }
                                b"wrapText" => alignment.wrap_text = parse_xml_bool(&value),
                                _ => {}
                            }
                        }
                        if let Some(xf) = xf.as_mut() {
                            xf.alignment = Some(alignment);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"fonts" | b"fills" | b"borders" | b"cellXfs" => section = Section::None,
                b"font" => {
                    if let Some(font) = font.take() {
                        pool.fonts.push(font);
                    }
                }
                b"fill" => {
                    if let Some(fill) = fill.take() {
                        pool.fills.push(fill);
                    }
                }
                b"border" => {
                    if let Some(border) = border.take() {
                        pool.borders.push(border);
                    }
                }
                b"left" | b"right" | b"top" | b"bottom" => {
                    if let Some(pending) = edge.take() {
                        commit_edge(&mut border, pending);
                    }
                }
                b"xf" => {
                    if let Some(row) = xf.take() {
                        pool.cell_formats.push(row);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(pool)
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn set_font_flag(
    font: &mut Option<Font>,
    e: &BytesStart<'_>,
    set: impl Fn(&mut Font, bool),
) -> Result<(), XlsxError> {
    // Flag elements are true by default; `val` can negate (`0`, `false`)
    // or, for underline, name a variant (`none` negates, the rest enable).
    let value = match attr_value(e, b"val")? {
        None => true,
        Some(v) => !(v == "0" || v.eq_ignore_ascii_case("false") || v == "none"),
    };
    if let Some(font) = font.as_mut() {
        set(font, value);
    }
    Ok(())
}

fn commit_edge(border: &mut Option<Border>, pending: (EdgeSlot, Option<BorderStyle>, Option<Color>)) {
    let (slot, style, color) = pending;
    let Some(style) = style else { return };
    let Some(border) = border.as_mut() else { return };
    let edge = Some(BorderEdge { style, color });
    match slot {
        EdgeSlot::Left => border.left = edge,
        EdgeSlot::Right => border.right = edge,
        EdgeSlot::Top => border.top = edge,
        EdgeSlot::Bottom => border.bottom = edge,
    }
}

pub fn write_styles(pool: &StylePool) -> Vec<u8> {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );

    if !pool.number_formats.is_empty() {
        xml.push_str(&format!(r#"<numFmts count="{}">"#, pool.number_formats.len()));
        for format in &pool.number_formats {
            xml.push_str(&format!(
                r#"<numFmt numFmtId="{}" formatCode="{}"/>"#,
                format.id,
                escape_attr(format.code.as_deref().unwrap_or(""))
            ));
        }
        xml.push_str("</numFmts>");
    }

    xml.push_str(&format!(r#"<fonts count="{}">"#, pool.fonts.len()));
    for font in &pool.fonts {
        xml.push_str("<font>");
        if font.bold {
            xml.push_str("<b/>");
        }
        if font.italic {
            xml.push_str("<i/>");
        }
        if font.underline {
            xml.push_str("<u/>");
        }
        if let Some(size) = font.size_100pt {
            xml.push_str(&format!(r#"<sz val="{}"/>"#, f64::from(size) / 100.0));
        }
        if let Some(color) = font.color {
            xml.push_str(&format!(r#"<color rgb="{}"/>"#, color.to_hex()));
        }
        if let Some(name) = &font.name {
            xml.push_str(&format!(r#"<name val="{}"/>"#, escape_attr(name)));
        }
        xml.push_str("</font>");
    }
    xml.push_str("</fonts>");

    xml.push_str(&format!(r#"<fills count="{}">"#, pool.fills.len()));
    for fill in &pool.fills {
        xml.push_str("<fill><patternFill patternType=\"");
        xml.push_str(fill.pattern.as_attr());
        xml.push('"');
        if fill.foreground.is_none() && fill.background.is_none() {
            xml.push_str("/></fill>");
            continue;
        }
        xml.push('>');
        if let Some(color) = fill.foreground {
            xml.push_str(&format!(r#"<fgColor rgb="{}"/>"#, color.to_hex()));
        }
        if let Some(color) = fill.background {
            xml.push_str(&format!(r#"<bgColor rgb="{}"/>"#, color.to_hex()));
        }
        xml.push_str("</patternFill></fill>");
    }
    xml.push_str("</fills>");

    xml.push_str(&format!(r#"<borders count="{}">"#, pool.borders.len()));
    for border in &pool.borders {
        xml.push_str("<border>");
        write_edge(&mut xml, "left", border.left);
        write_edge(&mut xml, "right", border.right);
        write_edge(&mut xml, "top", border.top);
        write_edge(&mut xml, "bottom", border.bottom);
        xml.push_str("<diagonal/>");
        xml.push_str("</border>");
    }
    xml.push_str("</borders>");

    xml.push_str(
        r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    );

    xml.push_str(&format!(r#"<cellXfs count="{}">"#, pool.cell_formats.len()));
    for row in &pool.cell_formats {
        xml.push_str(&format!(
            r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="0""#,
            row.number_format_id.unwrap_or(0),
            row.font_id.unwrap_or(0),
            row.fill_id.unwrap_or(0),
            row.border_id.unwrap_or(0),
        ));
        for (flag, name) in [
            (row.apply_font, "applyFont"),
            (row.apply_fill, "applyFill"),
            (row.apply_border, "applyBorder"),
            (row.apply_number_format, "applyNumberFormat"),
            (row.apply_alignment, "applyAlignment"),
        ] {
            if flag {
                xml.push_str(&format!(r#" {name}="1""#));
            }
        }
        match &row.alignment {
            None => xml.push_str("/>"),
            Some(alignment) => {
                xml.push('>');
                xml.push_str("<alignment");
                if let Some(h) = alignment.horizontal {
                    xml.push_str(&format!(r#" horizontal="{}""#, h.as_attr()));
                }
                if let Some(v) = alignment.vertical {
                    xml.push_str(&format!(r#" vertical="{}""#, v.as_attr()));
                }
                if alignment.wrap_text {
                    xml.push_str(r#" wrapText="1""#);
                }
                xml.push_str("/></xf>");
            }
        }
    }
    xml.push_str("</cellXfs>");

    xml.push_str(
        r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    );
    xml.push_str("</styleSheet>");
    xml.into_bytes()
}

fn write_edge(xml: &mut String, name: &str, edge: Option<BorderEdge>) {
    match edge {
        None => xml.push_str(&format!("<{name}/>")),
        Some(edge) => {
            xml.push_str(&format!(r#"<{name} style="{}">"#, edge.style.as_attr()));
            if let Some(color) = edge.color {
                xml.push_str(&format!(r#"<color rgb="{}"/>"#, color.to_hex()));
            }
            xml.push_str(&format!("</{name}>"));
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sheetstamp_model::SpreadsheetStyle;

    use super::*;

    #[test]
    fn blank_stylesheet_matches_stock_pool() {
        let xml = write_styles(&StylePool::new());
        let parsed = parse_styles(&xml).unwrap();
        assert_eq!(parsed, StylePool::new());
    }

    #[test]
    fn styles_roundtrip_through_xml() {
        let mut pool = StylePool::new();
        let style = SpreadsheetStyle::new()
            .font_name("Arial")
            .font_size(9.0)
            .bold(true)
            .color(Color::from_hex("FF0000").unwrap())
            .background(Color::from_hex("DDEBF7").unwrap())
            .border_bottom(BorderStyle::Medium, Some(Color::black()))
            .wrap_text(true)
            .number_format_code("0.000");
        let index = pool.lookup_style_index(&style);
        let date_index = pool.builtin_style_index(14);

        let parsed = parse_styles(&write_styles(&pool)).unwrap();
        assert_eq!(parsed, pool);
        assert_eq!(parsed.number_format_of(index), Some(164));
        assert_eq!(parsed.number_format_of(date_index), Some(14));
    }

    #[test]
    fn parses_sparse_xf_rows() {
        let xml = br#"<?xml version="1.0"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="10.5"/><name val="Arial"/></font></fonts>
  <fills count="1"><fill><patternFill patternType="none"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/></border></borders>
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
    <xf numFmtId="14" applyNumberFormat="1"/>
  </cellXfs>
</styleSheet>"#;
        let pool = parse_styles(xml).unwrap();
        assert_eq!(pool.fonts[0].size_100pt, Some(1050));
        assert_eq!(pool.cell_formats.len(), 2);
        let sparse = &pool.cell_formats[1];
        assert_eq!(sparse.number_format_id, Some(14));
        assert_eq!(sparse.font_id, None);
        assert!(sparse.apply_number_format);
    }
}
