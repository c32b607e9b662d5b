extern crate rusqlite;

use crate::error::Result;
use crate::extract::TicketRecord;

use rusqlite::{params, Connection};

pub fn persist_tickets(tickets: &[TicketRecord], db_name: &str) -> Result<usize> {
    let mut conn = Connection::open(db_name)?;
    persist_tickets_into(&mut conn, tickets)
}

pub fn persist_tickets_into(conn: &mut Connection, tickets: &[TicketRecord]) -> Result<usize> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tickets (
            id INTEGER PRIMARY KEY,
            ticket_date TEXT NOT NULL,
            route TEXT NOT NULL,
            tickets INTEGER NOT NULL,
            amount REAL NOT NULL,
            billing_type TEXT NOT NULL
        )",
        [],
    )?;

    let tx = conn.transaction()?;
    for ticket in tickets {
        tx.execute(
            "INSERT INTO tickets (ticket_date, route, tickets, amount, billing_type) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ticket.date.format("%Y-%m-%d").to_string(),
                ticket.route,
                ticket.tickets,
                ticket.amount,
                ticket.billing_type
            ],
        )?;
    }
    tx.commit()?;
    Ok(tickets.len())
}
