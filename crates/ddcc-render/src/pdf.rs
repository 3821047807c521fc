//! PDF encoding of a [`CertificateLayout`] with printpdf.

use std::io::Cursor;

use printpdf::{
  BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
  PdfDocumentReference, PdfLayerReference, Rect, Rgb,
  image_crate::codecs::png::PngDecoder,
};

use crate::{
  Error, RenderAssets, Result,
  layout::{
    ATTESTATION_Y, CertificateLayout, LINE_HEIGHT, LOGO_HEIGHT, LOGO_TOP, MARGIN,
    PAGE_HEIGHT, PAGE_WIDTH, PageSlice, QR_BOTTOM, QR_SIZE, ROW_HEIGHT, TITLE_Y,
  },
  qr::QrMatrix,
};

const TITLE_SIZE: f32 = 18.0;
const BODY_SIZE: f32 = 11.0;
const TABLE_SIZE: f32 = 10.0;
const FOOTER_SIZE: f32 = 8.0;

const COLUMN_X: [f32; 3] = [MARGIN, 110.0, 145.0];
const PT_TO_MM: f32 = 0.352_778;

fn pdf_err(e: impl std::fmt::Display) -> Error { Error::Pdf(e.to_string()) }

struct Fonts {
  regular: IndirectFontRef,
  bold:    IndirectFontRef,
}

impl Fonts {
  fn load(doc: &PdfDocumentReference, assets: &RenderAssets) -> Result<Self> {
    let regular = match &assets.font_regular {
      Some(bytes) => doc.add_external_font(&bytes[..]),
      None => doc.add_builtin_font(BuiltinFont::Helvetica),
    }
    .map_err(pdf_err)?;
    let bold = match &assets.font_bold {
      Some(bytes) => doc.add_external_font(&bytes[..]),
      None => doc.add_builtin_font(BuiltinFont::HelveticaBold),
    }
    .map_err(pdf_err)?;
    Ok(Self { regular, bold })
  }
}

fn black() -> Color { Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)) }

fn header_fill() -> Color { Color::Rgb(Rgb::new(0.88, 0.88, 0.88, None)) }

/// Rough Helvetica advance width, good enough for centring short lines.
fn approx_width(text: &str, size: f32) -> f32 { text.chars().count() as f32 * size * 0.55 * PT_TO_MM }

fn centred_x(text: &str, size: f32) -> f32 {
  ((PAGE_WIDTH - approx_width(text, size)) / 2.0).max(MARGIN)
}

pub(crate) fn encode(
  layout: &CertificateLayout,
  qr: &QrMatrix,
  assets: &RenderAssets,
) -> Result<Vec<u8>> {
  let (doc, first_page, first_layer) =
    PdfDocument::new(layout.title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Certificate");
  let fonts = Fonts::load(&doc, assets)?;
  let page_count = layout.pages.len();

  for (index, slice) in layout.pages.iter().enumerate() {
    let layer = if index == 0 {
      doc.get_page(first_page).get_layer(first_layer)
    } else {
      let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Certificate");
      doc.get_page(page).get_layer(layer)
    };

    if index == 0 {
      if let Some(png) = &assets.logo_png {
        draw_logo(&layer, png)?;
      }
      draw_heading(&layer, layout, &fonts);
    }
    draw_table(&layer, layout, slice, &fonts);
    draw_qr(&layer, qr);
    if page_count > 1 {
      let footer = format!("Page {} of {}", index + 1, page_count);
      layer.use_text(
        footer,
        FOOTER_SIZE,
        Mm(PAGE_WIDTH - MARGIN - 20.0),
        Mm(QR_BOTTOM),
        &fonts.regular,
      );
    }
  }

  doc.save_to_bytes().map_err(pdf_err)
}

fn draw_logo(layer: &PdfLayerReference, png: &[u8]) -> Result<()> {
  let decoder = PngDecoder::new(Cursor::new(png)).map_err(pdf_err)?;
  let image = Image::try_from(decoder).map_err(pdf_err)?;

  // At `dpi`, one pixel is 25.4 / dpi mm; scale so the height is LOGO_HEIGHT.
  let dpi = 300.0;
  let natural_height = image.image.height.0 as f32 * 25.4 / dpi;
  let natural_width = image.image.width.0 as f32 * 25.4 / dpi;
  let scale = if natural_height > 0.0 { LOGO_HEIGHT / natural_height } else { 1.0 };

  image.add_to_layer(layer.clone(), ImageTransform {
    translate_x: Some(Mm((PAGE_WIDTH - natural_width * scale) / 2.0)),
    translate_y: Some(Mm(LOGO_TOP - LOGO_HEIGHT)),
    scale_x: Some(scale),
    scale_y: Some(scale),
    dpi: Some(dpi),
    ..Default::default()
  });
  Ok(())
}

fn draw_heading(layer: &PdfLayerReference, layout: &CertificateLayout, fonts: &Fonts) {
  layer.set_fill_color(black());
  layer.use_text(
    layout.title.as_str(),
    TITLE_SIZE,
    Mm(centred_x(&layout.title, TITLE_SIZE)),
    Mm(TITLE_Y),
    &fonts.bold,
  );
  for (i, line) in layout.attestation_lines.iter().enumerate() {
    layer.use_text(
      line.as_str(),
      BODY_SIZE,
      Mm(MARGIN),
      Mm(ATTESTATION_Y - i as f32 * LINE_HEIGHT),
      &fonts.regular,
    );
  }
}

fn draw_table(
  layer: &PdfLayerReference,
  layout: &CertificateLayout,
  slice: &PageSlice,
  fonts: &Fonts,
) {
  let header_y = slice.header_y;
  let text_offset = 2.5;

  layer.set_fill_color(header_fill());
  layer.add_rect(Rect::new(
    Mm(MARGIN),
    Mm(header_y - 2.0),
    Mm(PAGE_WIDTH - MARGIN),
    Mm(header_y - 2.0 + ROW_HEIGHT),
  ));
  layer.set_fill_color(black());
  for (x, label) in COLUMN_X.iter().zip(layout.columns) {
    layer.use_text(label, TABLE_SIZE, Mm(*x + 1.0), Mm(header_y + text_offset - 2.0), &fonts.bold);
  }

  let rows = &layout.rows[slice.first_row..slice.first_row + slice.row_count];
  for (i, row) in rows.iter().enumerate() {
    let y = header_y - (i + 1) as f32 * ROW_HEIGHT;
    let cells = [&row.vaccine, &row.dose, &row.date];
    for (x, cell) in COLUMN_X.iter().zip(cells) {
      layer.use_text(cell.as_str(), TABLE_SIZE, Mm(*x + 1.0), Mm(y + text_offset - 2.0), &fonts.regular);
    }
    // Hairline under each row.
    layer.add_rect(Rect::new(
      Mm(MARGIN),
      Mm(y - 2.0),
      Mm(PAGE_WIDTH - MARGIN),
      Mm(y - 1.8),
    ));
  }
}

fn draw_qr(layer: &PdfLayerReference, qr: &QrMatrix) {
  let modules = qr.width().max(1) as f32;
  let module = QR_SIZE / modules;
  let left = (PAGE_WIDTH - QR_SIZE) / 2.0;
  let top = QR_BOTTOM + QR_SIZE;

  layer.set_fill_color(black());
  for (row, start, len) in qr.dark_runs() {
    let x0 = left + start as f32 * module;
    let y1 = top - row as f32 * module;
    layer.add_rect(Rect::new(
      Mm(x0),
      Mm(y1 - module),
      Mm(x0 + len as f32 * module),
      Mm(y1),
    ));
  }
}
