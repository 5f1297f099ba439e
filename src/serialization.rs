//! Output writers for conversion results.
//!
//! Records go out as NDJSON (one record per line) or as a single JSON array;
//! [`ConversionSummary`] condenses a whole run for a quick look.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::error::SerializationError;
use crate::hugo::Conversion;

/// NDJSON (Newline Delimited JSON) writer
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write a single record as an NDJSON line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<T: Serialize>(&mut self, records: &[T]) -> Result<(), SerializationError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Lines written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
///
/// The opening bracket is written on construction; call [`finish`](Self::finish)
/// to close the array.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
        })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        serde_json::to_writer(&mut self.writer, record)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), SerializationError> {
        writeln!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Counts and derived paths of a conversion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSummary {
    pub site_url: String,
    pub items: usize,
    pub content_bodies: usize,
    /// Page `wp_id` -> parent path, for pages with a record
    pub page_paths: BTreeMap<i64, String>,
    pub drafts: usize,
    pub original_image_urls: Vec<String>,
    pub image_paths: Vec<String>,
    pub counters: BTreeMap<String, u64>,
}

impl From<&Conversion> for ConversionSummary {
    fn from(conversion: &Conversion) -> Self {
        let page_paths = conversion
            .page_map
            .iter()
            .filter(|(_, node)| node.page_index.is_some())
            .map(|(id, node)| (id, node.parent_path.clone()))
            .collect();
        let drafts = conversion
            .items
            .iter()
            .filter(|item| item.get("draft").and_then(|d| d.as_bool()) == Some(true))
            .count();

        Self {
            site_url: conversion.site_url.clone(),
            items: conversion.items.len(),
            content_bodies: conversion.content.len(),
            page_paths,
            drafts,
            original_image_urls: conversion.assets.originals.clone(),
            image_paths: conversion.assets.rewritten.clone(),
            counters: conversion.counters.iter().cloned().collect(),
        }
    }
}
