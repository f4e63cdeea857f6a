//! Spreadsheet rendering.
//!
//! [`render_xlsx`] is pure and synchronous: one worksheet named after the
//! report kind, a bold header row, then one row per record in dataset order.
//! [`render_into`] runs it on the blocking pool and hands the bytes to the
//! store, which makes them visible atomically.

use crate::server::store::ReportStore;
use croplink_core::{
    Error, Result,
    chrono::Datelike,
    dataset::{Cell, ReportDataset},
    types::ReportFileName,
};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};

/// Serializes `dataset` to xlsx bytes.
pub fn render_xlsx(dataset: &ReportDataset) -> Result<Vec<u8>> {
    build_workbook(dataset).map_err(|e| Error::Render {
        context: e.to_string(),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn build_workbook(dataset: &ReportDataset) -> core::result::Result<Vec<u8>, XlsxError> {
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(dataset.kind().sheet_name())?;

    for (col, title) in dataset.headers().iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, title, &header_format)?;
    }

    for (i, record) in dataset.rows().iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, cell) in record.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Date(date) => {
                    // Years outside 1900..=9999 fail here and fail the render.
                    let year = u16::try_from(date.year()).unwrap_or(0);
                    let datetime =
                        ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)?;
                    sheet.write_datetime_with_format(row, col, &datetime, &date_format)?;
                }
                Cell::Text(text) => {
                    sheet.write_string(row, col, text)?;
                }
                Cell::Number(value) => {
                    sheet.write_number(row, col, *value)?;
                }
            }
        }
    }

    sheet.autofit();
    workbook.save_to_buffer()
}

/// Renders `dataset` off the async runtime and stores it as `name`.
///
/// Returns the number of bytes written.
pub async fn render_into(
    store: &dyn ReportStore,
    name: &ReportFileName,
    dataset: ReportDataset,
) -> Result<usize> {
    let bytes = tokio::task::spawn_blocking(move || render_xlsx(&dataset))
        .await
        .map_err(|e| Error::Render {
            context: format!("render task aborted: {e}"),
        })??;
    let len = bytes.len();
    store.put(&name.to_string(), bytes).await?;
    Ok(len)
}

/// Reads the cell text of the first worksheet back out of a saved workbook,
/// one `Vec` per row. Shared strings are resolved; numbers and dates come
/// back as their stored serial text.
#[cfg(test)]
pub(crate) fn read_first_sheet(bytes: &[u8]) -> Vec<Vec<String>> {
    use std::io::Read;

    fn part(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>, name: &str) -> String {
        let mut xml = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
        let start = text.find(open)? + open.len();
        let end = text[start..].find(close)? + start;
        Some(&text[start..end])
    }

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let sheet = part(&mut archive, "xl/worksheets/sheet1.xml");
    let shared: Vec<String> = if archive.by_name("xl/sharedStrings.xml").is_ok() {
        part(&mut archive, "xl/sharedStrings.xml")
            .split("<si>")
            .skip(1)
            .map(|si| {
                let t = &si[si.find("<t").unwrap()..];
                between(t, ">", "</t>").unwrap().to_string()
            })
            .collect()
    } else {
        Vec::new()
    };

    sheet
        .split("<row ")
        .skip(1)
        .map(|row| {
            let row = &row[..row.find("</row>").unwrap_or(row.len())];
            row.split("<c ")
                .skip(1)
                .map(|cell| {
                    let attrs = &cell[..cell.find('>').unwrap()];
                    let value = between(cell, "<v>", "</v>").unwrap_or_default();
                    if attrs.contains(r#"t="s""#) {
                        shared[value.parse::<usize>().unwrap()].clone()
                    } else {
                        value.to_string()
                    }
                })
                .collect()
        })
        .collect()
}
