//! Per-(year, direction) registry number allocation.
//!
//! Every allocation is a single `INSERT .. ON CONFLICT DO UPDATE ..
//! RETURNING` statement: it lazily creates the counter at 1 on first use and
//! otherwise increments and fetches in one step. Postgres takes a row lock
//! on the counter for the duration of the statement's transaction, so
//! concurrent allocations for the same key serialize while different keys
//! proceed in parallel, and no two callers can ever observe the same value.
//!
//! Callers run `allocate` on a plain (autocommit) connection *before* the
//! transaction that inserts the document. A document insert that later
//! fails leaves the issued number as a permanent gap; it is never reissued.
//! Retried creates must call `allocate` again rather than reuse a number.

use diesel::prelude::*;
use diesel::QueryResult;

use crate::models::Direction;
use crate::schema::sequence_counters;

/// Issues the next number for the given year and direction, starting at 1.
pub fn allocate(conn: &mut PgConnection, direction: Direction, year: i32) -> QueryResult<i32> {
    diesel::insert_into(sequence_counters::table)
        .values((
            sequence_counters::year.eq(year),
            sequence_counters::direction.eq(direction.as_str()),
            sequence_counters::last_number.eq(1),
        ))
        .on_conflict((sequence_counters::year, sequence_counters::direction))
        .do_update()
        .set(sequence_counters::last_number.eq(sequence_counters::last_number + 1))
        .returning(sequence_counters::last_number)
        .get_result(conn)
}

/// Last number issued for a key, without allocating. `None` when the year
/// has never been used for that direction.
pub fn current(
    conn: &mut PgConnection,
    direction: Direction,
    year: i32,
) -> QueryResult<Option<i32>> {
    sequence_counters::table
        .find((year, direction.as_str()))
        .select(sequence_counters::last_number)
        .first(conn)
        .optional()
}
