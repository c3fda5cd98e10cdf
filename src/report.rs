use crate::consent::{self, ConsentRecord};
use crate::errors::AppError;
use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LINE_HEIGHT: f32 = 6.0;
const WRAP_COLUMNS: usize = 90;

pub fn pdf_filename(record: &ConsentRecord) -> String {
    format!("consentimiento-{}.pdf", record.id)
}

/// Writes lines top to bottom, starting a new page when the current one fills up.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, AppError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Capa 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::Pdf(format!("{e:?}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::Pdf(format!("{e:?}")))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
        })
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Capa 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.ensure_room(size * 0.6);
        self.layer
            .use_text(text, size, Mm(MARGIN), Mm(self.y), &self.bold);
        self.y -= size * 0.6;
    }

    fn line(&mut self, text: &str) {
        for chunk in wrap(text, WRAP_COLUMNS) {
            self.ensure_room(LINE_HEIGHT);
            self.layer
                .use_text(chunk, 10.0, Mm(MARGIN), Mm(self.y), &self.regular);
            self.y -= LINE_HEIGHT;
        }
    }

    fn field(&mut self, label: &str, value: &str) {
        self.line(&format!("{label}: {value}"));
    }

    fn gap(&mut self) {
        self.y -= LINE_HEIGHT / 2.0;
    }

    fn finish(self) -> Result<Vec<u8>, AppError> {
        self.doc
            .save_to_bytes()
            .map_err(|e| AppError::Pdf(format!("{e:?}")))
    }
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Render a consent certificate.
pub fn render_consent_pdf(
    record: &ConsentRecord,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, AppError> {
    let mut page = PageWriter::new(&format!("Consentimiento {}", record.id))?;

    page.heading("Constancia de consentimiento", 16.0);
    page.line(&consent::summarize_subject(record));
    page.gap();

    page.field("Identificador", &record.id);
    page.field("Estado", consent::describe_status(record.status));
    page.field("Finalidad", &record.purpose);
    page.field("Categorías de datos", &list_or_dash(&record.data_categories));
    page.field("Método de obtención", &record.collection_method);
    page.field("Fecha de otorgamiento", &record.granted_at.to_string());
    page.field(
        "Plazo de conservación",
        &format!("{} meses", record.retention_months),
    );
    page.field("Fecha de expiración", &record.expires_at.to_string());
    page.field(
        "Transferencia internacional",
        if record.international_transfer { "Sí" } else { "No" },
    );
    if record.international_transfer {
        page.field("Países de destino", &list_or_dash(&record.destination_countries));
    }
    if let Some(notes) = &record.notes {
        page.field("Observaciones", notes);
    }

    page.gap();
    page.heading("Historial", 12.0);
    if record.history.is_empty() {
        page.line("Sin movimientos registrados");
    }
    for entry in &record.history {
        let mut text = format!(
            "{} - {} ({})",
            format_timestamp(entry.timestamp),
            entry.action,
            consent::describe_status(entry.status)
        );
        if let Some(note) = &entry.note {
            text.push_str(": ");
            text.push_str(note);
        }
        page.line(&text);
    }

    page.gap();
    page.line(&format!("Generado el {}", format_timestamp(generated_at.timestamp())));

    page.finish()
}
