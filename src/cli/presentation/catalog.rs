//! Catalog presentation: supported models and stacks.

use super::to_pretty_json;
use crate::catalog::{BackendModel, Catalog};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;

pub fn format_catalog_text(catalog: &Catalog) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Model", "Family", "Video"]);
    for id in &catalog.models {
        let (family, video) = match id.parse::<BackendModel>() {
            Ok(model) => (
                model.family().to_string(),
                if model.supports_video() { "yes" } else { "no" },
            ),
            Err(_) => ("unknown".to_string(), "no"),
        };
        table.add_row(vec![id.clone(), family, video.to_string()]);
    }

    let mut output = String::from("Models\n");
    output.push_str(&table.to_string());
    output.push_str("\n\nStacks\n");
    for stack in &catalog.stacks {
        output.push_str(&format!("  {}\n", stack));
    }
    output
}

pub fn format_catalog_json(catalog: &Catalog) -> String {
    to_pretty_json(catalog)
}
