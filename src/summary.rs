use crate::error::Result;
use crate::extract::TicketRecord;

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

pub const COLUMNS: [&str; 7] = [
    "DATE",
    "CLIENT",
    "PROJET",
    "TYPE DE FACTURATION",
    "DESCRIPTION",
    "TYPE",
    "MONTANT",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub date: NaiveDate,
    pub client: String,
    pub project: String,
    pub billing_type: String,
    pub description: String,
    pub kind: String,
    pub amount: f64,
}

struct DayGroup<'a> {
    first: &'a TicketRecord,
    tickets: u32,
    amount: f64,
    routes: Vec<&'a str>,
}

/// One row per day, ordered by date, with `daily_fare` added to each.
pub fn summarize(records: &[TicketRecord], daily_fare: f64) -> Vec<SummaryRow> {
    let mut days: BTreeMap<NaiveDate, DayGroup> = BTreeMap::new();
    for record in records {
        let group = days.entry(record.date).or_insert_with(|| DayGroup {
            first: record,
            tickets: 0,
            amount: 0.0,
            routes: Vec::new(),
        });
        group.tickets += record.tickets;
        group.amount += record.amount;
        if !group.routes.contains(&record.route.as_str()) {
            group.routes.push(&record.route);
        }
    }

    days.into_iter()
        .map(|(date, group)| SummaryRow {
            date,
            client: group.first.client.clone(),
            project: group.first.project.clone(),
            billing_type: group.first.billing_type.clone(),
            description: describe(group.tickets, &group.routes.join(", ")),
            kind: group.first.kind.clone(),
            amount: group.amount + daily_fare,
        })
        .collect()
}

fn describe(tickets: u32, routes: &str) -> String {
    format!(
        "{} billet{} de train ({}) et taxi aller-retour",
        tickets,
        if tickets > 1 { "s" } else { "" },
        routes
    )
}

/// Whole amounts keep one decimal (`75.0`), others print as-is (`42.5`).
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{:.1}", amount)
    } else {
        format!("{}", amount)
    }
}

pub fn write_summary<W: Write>(rows: &[SummaryRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&COLUMNS)?;
    for row in rows {
        let date = row.date.format("%d/%m/%Y").to_string();
        let amount = format_amount(row.amount);
        csv_writer.write_record(&[
            date.as_str(),
            row.client.as_str(),
            row.project.as_str(),
            row.billing_type.as_str(),
            row.description.as_str(),
            row.kind.as_str(),
            amount.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_summary_csv(rows: &[SummaryRow], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_summary(rows, file)
}
