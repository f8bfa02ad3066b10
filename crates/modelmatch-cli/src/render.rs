//! Console rendering of catalogs and results.

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use modelmatch_core::{ComparisonResult, ModelCatalog};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Configured models, sorted by display name.
pub fn model_list(catalog: &ModelCatalog) -> String {
    let mut table = table();
    table.set_header(vec!["Display Name", "Model ID", "Provider"]);
    for entry in catalog.sorted_by_display_name() {
        table.add_row(vec![
            entry.display_name.clone(),
            entry.model_id.clone(),
            entry.provider.clone(),
        ]);
    }
    table.to_string()
}

/// Ranked leaderboard. Unscored models come last with rank `-` and `N/A`.
pub fn leaderboard(result: &ComparisonResult) -> String {
    let mut table = table();
    table.set_header(vec!["Rank", "Model", "Average Score", "Scored"]);
    for standing in result.evaluation.leaderboard.standings() {
        table.add_row(vec![
            standing
                .rank
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            standing.model_id.clone(),
            standing
                .average_score
                .map(|avg| format!("{:.2}", avg))
                .unwrap_or_else(|| "N/A".to_string()),
            standing.scored_points.to_string(),
        ]);
    }
    table.to_string()
}

/// Short run summary printed above the leaderboard.
pub fn summary(result: &ComparisonResult) -> String {
    let params = &result.parameters;
    let mut lines = vec![
        format!(
            "Compared {} on {} data point(s), {} evaluation",
            params.models_compared.join(", "),
            params.num_data_points,
            params.evaluation_method
        ),
    ];
    if let Some(judge) = &params.reasoning_model_id {
        lines.push(format!("Reasoning model: {}", judge));
    }
    let failed = result.failed_calls();
    if failed > 0 {
        lines.push(format!("Failed generation calls: {}", failed));
    }
    lines.join("\n")
}

/// Per-data-point scores, justifications and issues.
pub fn details(result: &ComparisonResult) -> String {
    let mut out = String::new();
    for point in &result.evaluation.detailed_scores {
        out.push_str(&format!(
            "\nData point {}: {}\n",
            point.data_point_index + 1,
            one_line(&point.data.to_prompt_string(), 80)
        ));

        if point.scores.is_empty() && point.issues.is_empty() {
            out.push_str("  (no scores)\n");
        }
        for (model_id, record) in &point.scores {
            out.push_str(&format!("  {}: {}", model_id, record.score));
            if let Some(why) = &record.justification {
                out.push_str(&format!(" ({})", one_line(why, 160)));
            }
            out.push('\n');
        }
        for issue in &point.issues {
            out.push_str(&format!("  ! {}\n", issue));
        }
    }
    out
}

fn one_line(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
