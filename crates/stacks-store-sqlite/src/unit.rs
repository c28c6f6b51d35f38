//! [`SqliteUnit`]: the component contracts over one open transaction.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Params, Row};
use stacks_core::{
  Error as CoreError, Result as CoreResult,
  borrower::{Borrower, BorrowerRegistry},
  copy::{Copy, CopyInventory},
  fine::{Fine, FineBook, FineQuery},
  holiday::Holiday,
  loan::{Loan, LoanLedger, LoanQuery},
  reservation::{Reservation, ReservationQuery, ReservationQueue},
  settings::{Settings, SettingsVersion},
  store::PolicyStore,
};
use uuid::Uuid;

use crate::{
  encode::{
    RawBorrower, RawCopy, RawFine, RawHoliday, RawLoan, RawReservation, RawSettings,
    encode_copy_state, encode_date, encode_decimal, encode_dt, encode_fine_status,
    encode_lifecycle, encode_reservation_status, encode_role, encode_uuid,
  },
  error::IntoCore as _,
};

/// Borrowed view of a connection with a transaction open on it.
pub(crate) struct SqliteUnit<'a> {
  conn: &'a rusqlite::Connection,
}

impl<'a> SqliteUnit<'a> {
  pub(crate) fn new(conn: &'a rusqlite::Connection) -> Self { Self { conn } }

  fn query_opt<R>(
    &self,
    sql: &str,
    params: impl Params,
    map: impl FnOnce(&Row<'_>) -> rusqlite::Result<R>,
  ) -> CoreResult<Option<R>> {
    self.conn.query_row(sql, params, map).optional().core()
  }

  fn query_all<R>(
    &self,
    sql: &str,
    params: impl Params,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<R>,
  ) -> CoreResult<Vec<R>> {
    let mut stmt = self.conn.prepare_cached(sql).core()?;
    let rows = stmt.query_map(params, map).core()?;
    rows.collect::<rusqlite::Result<Vec<_>>>().core()
  }

  fn execute(&self, sql: &str, params: impl Params) -> CoreResult<usize> {
    self.conn.execute(sql, params).core()
  }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

fn decode_all<R, T>(raws: Vec<R>, decode: fn(R) -> crate::Result<T>) -> CoreResult<Vec<T>> {
  raws.into_iter().map(decode).collect::<crate::Result<Vec<_>>>().core()
}

// ─── Copies ──────────────────────────────────────────────────────────────────

impl CopyInventory for SqliteUnit<'_> {
  fn load_copy(&mut self, copy_id: Uuid) -> CoreResult<Option<Copy>> {
    let sql = format!("SELECT {} FROM copies WHERE copy_id = ?1", RawCopy::COLUMNS);
    self
      .query_opt(&sql, rusqlite::params![encode_uuid(copy_id)], RawCopy::from_row)?
      .map(RawCopy::into_copy)
      .transpose()
      .core()
  }

  fn save_copy_state(&mut self, copy: &Copy) -> CoreResult<()> {
    let (state, held_for) = encode_copy_state(copy.state);
    self.execute(
      "UPDATE copies SET state = ?2, held_for = ?3 WHERE copy_id = ?1",
      rusqlite::params![encode_uuid(copy.copy_id), state, held_for],
    )?;
    Ok(())
  }

  fn insert_copy(&mut self, copy: &Copy) -> CoreResult<()> {
    let (state, held_for) = encode_copy_state(copy.state);
    let inserted = self.conn.execute(
      "INSERT INTO copies (copy_id, title_id, accession_code, state, held_for, registered_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      rusqlite::params![
        encode_uuid(copy.copy_id),
        encode_uuid(copy.title_id),
        copy.accession_code,
        state,
        held_for,
        encode_dt(copy.registered_at),
      ],
    );
    match inserted {
      Ok(_) => Ok(()),
      Err(e) if is_unique_violation(&e) => {
        Err(CoreError::DuplicateAccession(copy.accession_code.clone()))
      }
      Err(e) => Err(e).core(),
    }
  }

  fn available_copies(&mut self, title_id: Uuid) -> CoreResult<Vec<Uuid>> {
    let ids: Vec<String> = self.query_all(
      "SELECT copy_id FROM copies
       WHERE title_id = ?1 AND state = 'available'
       ORDER BY registered_at, copy_id",
      rusqlite::params![encode_uuid(title_id)],
      |row| row.get(0),
    )?;
    ids
      .iter()
      .map(|s| crate::encode::decode_uuid(s))
      .collect::<crate::Result<Vec<_>>>()
      .core()
  }

  fn list_copies(&mut self, title_id: Option<Uuid>) -> CoreResult<Vec<Copy>> {
    let sql = format!(
      "SELECT {} FROM copies WHERE (?1 IS NULL OR title_id = ?1) ORDER BY registered_at, copy_id",
      RawCopy::COLUMNS
    );
    let raws = self.query_all(&sql, rusqlite::params![title_id.map(encode_uuid)], RawCopy::from_row)?;
    decode_all(raws, RawCopy::into_copy)
  }
}

// ─── Loans ───────────────────────────────────────────────────────────────────

impl LoanLedger for SqliteUnit<'_> {
  fn load_loan(&mut self, loan_id: Uuid) -> CoreResult<Option<Loan>> {
    let sql = format!("SELECT {} FROM loans WHERE loan_id = ?1", RawLoan::COLUMNS);
    self
      .query_opt(&sql, rusqlite::params![encode_uuid(loan_id)], RawLoan::from_row)?
      .map(RawLoan::into_loan)
      .transpose()
      .core()
  }

  fn open_loan_for_copy(&mut self, copy_id: Uuid) -> CoreResult<Option<Loan>> {
    let sql = format!(
      "SELECT {} FROM loans WHERE copy_id = ?1 AND return_date IS NULL",
      RawLoan::COLUMNS
    );
    self
      .query_opt(&sql, rusqlite::params![encode_uuid(copy_id)], RawLoan::from_row)?
      .map(RawLoan::into_loan)
      .transpose()
      .core()
  }

  fn insert_loan(&mut self, loan: &Loan) -> CoreResult<()> {
    self.execute(
      "INSERT INTO loans (
         loan_id, copy_id, title_id, borrower_id, issue_date,
         due_date, return_date, renewal_count, lifecycle
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      rusqlite::params![
        encode_uuid(loan.loan_id),
        encode_uuid(loan.copy_id),
        encode_uuid(loan.title_id),
        encode_uuid(loan.borrower_id),
        encode_date(loan.issue_date),
        encode_date(loan.due_date),
        loan.return_date.map(encode_date),
        loan.renewal_count,
        encode_lifecycle(loan.lifecycle),
      ],
    )?;
    Ok(())
  }

  fn update_loan(&mut self, loan: &Loan) -> CoreResult<()> {
    let changed = self.execute(
      "UPDATE loans
       SET due_date = ?2, return_date = ?3, renewal_count = ?4, lifecycle = ?5
       WHERE loan_id = ?1",
      rusqlite::params![
        encode_uuid(loan.loan_id),
        encode_date(loan.due_date),
        loan.return_date.map(encode_date),
        loan.renewal_count,
        encode_lifecycle(loan.lifecycle),
      ],
    )?;
    if changed == 0 {
      return Err(CoreError::LoanNotFound(loan.loan_id));
    }
    Ok(())
  }

  fn borrower_open_loans(&mut self, borrower_id: Uuid) -> CoreResult<Vec<Loan>> {
    let sql = format!(
      "SELECT {} FROM loans WHERE borrower_id = ?1 AND return_date IS NULL",
      RawLoan::COLUMNS
    );
    let raws = self.query_all(&sql, rusqlite::params![encode_uuid(borrower_id)], RawLoan::from_row)?;
    decode_all(raws, RawLoan::into_loan)
  }

  fn select_loans(&mut self, query: &LoanQuery) -> CoreResult<Vec<Loan>> {
    let sql = format!(
      "SELECT {} FROM loans
       WHERE (?1 IS NULL OR borrower_id = ?1)
         AND (?2 IS NULL OR title_id = ?2)
         AND (?3 IS NULL OR copy_id = ?3)
       ORDER BY issue_date DESC, rowid DESC",
      RawLoan::COLUMNS
    );
    let raws = self.query_all(
      &sql,
      rusqlite::params![
        query.borrower_id.map(encode_uuid),
        query.title_id.map(encode_uuid),
        query.copy_id.map(encode_uuid),
      ],
      RawLoan::from_row,
    )?;
    decode_all(raws, RawLoan::into_loan)
  }
}

// ─── Fines ───────────────────────────────────────────────────────────────────

impl FineBook for SqliteUnit<'_> {
  fn load_fine(&mut self, fine_id: Uuid) -> CoreResult<Option<Fine>> {
    let sql = format!("SELECT {} FROM fines WHERE fine_id = ?1", RawFine::COLUMNS);
    self
      .query_opt(&sql, rusqlite::params![encode_uuid(fine_id)], RawFine::from_row)?
      .map(RawFine::into_fine)
      .transpose()
      .core()
  }

  fn insert_fine(&mut self, fine: &Fine) -> CoreResult<()> {
    let assessment = fine
      .assessment
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;
    self.execute(
      "INSERT INTO fines (
         fine_id, borrower_id, loan_id, amount, reason, status,
         created_on, paid_on, receipt, assessment
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      rusqlite::params![
        encode_uuid(fine.fine_id),
        encode_uuid(fine.borrower_id),
        fine.loan_id.map(encode_uuid),
        encode_decimal(fine.amount),
        fine.reason,
        encode_fine_status(fine.status),
        encode_date(fine.created_on),
        fine.paid_on.map(encode_date),
        fine.receipt,
        assessment,
      ],
    )?;
    Ok(())
  }

  fn update_fine(&mut self, fine: &Fine) -> CoreResult<()> {
    let changed = self.execute(
      "UPDATE fines
       SET amount = ?2, reason = ?3, status = ?4, paid_on = ?5, receipt = ?6
       WHERE fine_id = ?1",
      rusqlite::params![
        encode_uuid(fine.fine_id),
        encode_decimal(fine.amount),
        fine.reason,
        encode_fine_status(fine.status),
        fine.paid_on.map(encode_date),
        fine.receipt,
      ],
    )?;
    if changed == 0 {
      return Err(CoreError::FineNotFound(fine.fine_id));
    }
    Ok(())
  }

  fn delete_fine_row(&mut self, fine_id: Uuid) -> CoreResult<bool> {
    let changed =
      self.execute("DELETE FROM fines WHERE fine_id = ?1", rusqlite::params![encode_uuid(fine_id)])?;
    Ok(changed > 0)
  }

  fn select_fines(&mut self, query: &FineQuery) -> CoreResult<Vec<Fine>> {
    let sql = format!(
      "SELECT {} FROM fines
       WHERE (?1 IS NULL OR status = ?1)
         AND (?2 IS NULL OR borrower_id = ?2)
         AND (?3 IS NULL OR loan_id = ?3)
       ORDER BY created_on DESC, rowid DESC",
      RawFine::COLUMNS
    );
    let raws = self.query_all(
      &sql,
      rusqlite::params![
        query.status.map(encode_fine_status),
        query.borrower_id.map(encode_uuid),
        query.loan_id.map(encode_uuid),
      ],
      RawFine::from_row,
    )?;
    decode_all(raws, RawFine::into_fine)
  }
}

// ─── Reservations ────────────────────────────────────────────────────────────

impl ReservationQueue for SqliteUnit<'_> {
  fn load_reservation(&mut self, reservation_id: Uuid) -> CoreResult<Option<Reservation>> {
    let sql = format!(
      "SELECT {} FROM reservations WHERE reservation_id = ?1",
      RawReservation::COLUMNS
    );
    self
      .query_opt(&sql, rusqlite::params![encode_uuid(reservation_id)], RawReservation::from_row)?
      .map(RawReservation::into_reservation)
      .transpose()
      .core()
  }

  fn insert_reservation(&mut self, reservation: &Reservation) -> CoreResult<Reservation> {
    let inserted = self.conn.execute(
      "INSERT INTO reservations (
         reservation_id, title_id, borrower_id, reserved_at, status,
         pickup_deadline, offered_copy_id, cancel_reason, loan_id, closed_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      rusqlite::params![
        encode_uuid(reservation.reservation_id),
        encode_uuid(reservation.title_id),
        encode_uuid(reservation.borrower_id),
        encode_dt(reservation.reserved_at),
        encode_reservation_status(reservation.status),
        reservation.pickup_deadline.map(encode_dt),
        reservation.offered_copy_id.map(encode_uuid),
        reservation.cancel_reason,
        reservation.loan_id.map(encode_uuid),
        reservation.closed_at.map(encode_dt),
      ],
    );
    match inserted {
      Ok(_) => Ok(Reservation {
        sequence: self.conn.last_insert_rowid(),
        ..reservation.clone()
      }),
      Err(e) if is_unique_violation(&e) => Err(CoreError::DuplicateActive {
        title_id:    reservation.title_id,
        borrower_id: reservation.borrower_id,
      }),
      Err(e) => Err(e).core(),
    }
  }

  fn update_reservation(&mut self, reservation: &Reservation) -> CoreResult<()> {
    let changed = self.execute(
      "UPDATE reservations
       SET status = ?2, pickup_deadline = ?3, offered_copy_id = ?4,
           cancel_reason = ?5, loan_id = ?6, closed_at = ?7
       WHERE reservation_id = ?1",
      rusqlite::params![
        encode_uuid(reservation.reservation_id),
        encode_reservation_status(reservation.status),
        reservation.pickup_deadline.map(encode_dt),
        reservation.offered_copy_id.map(encode_uuid),
        reservation.cancel_reason,
        reservation.loan_id.map(encode_uuid),
        reservation.closed_at.map(encode_dt),
      ],
    )?;
    if changed == 0 {
      return Err(CoreError::ReservationNotFound(reservation.reservation_id));
    }
    Ok(())
  }

  fn active_reservations(&mut self, title_id: Uuid) -> CoreResult<Vec<Reservation>> {
    let sql = format!(
      "SELECT {} FROM reservations
       WHERE title_id = ?1 AND status = 'active'
       ORDER BY reserved_at, seq",
      RawReservation::COLUMNS
    );
    let raws = self.query_all(&sql, rusqlite::params![encode_uuid(title_id)], RawReservation::from_row)?;
    decode_all(raws, RawReservation::into_reservation)
  }

  fn select_reservations(&mut self, query: &ReservationQuery) -> CoreResult<Vec<Reservation>> {
    let sql = format!(
      "SELECT {} FROM reservations
       WHERE (?1 IS NULL OR title_id = ?1)
         AND (?2 IS NULL OR borrower_id = ?2)
         AND (?3 IS NULL OR status = ?3)
       ORDER BY reserved_at, seq",
      RawReservation::COLUMNS
    );
    let raws = self.query_all(
      &sql,
      rusqlite::params![
        query.title_id.map(encode_uuid),
        query.borrower_id.map(encode_uuid),
        query.status.map(encode_reservation_status),
      ],
      RawReservation::from_row,
    )?;
    decode_all(raws, RawReservation::into_reservation)
  }

  fn lapsed_offers(&mut self, now: DateTime<Utc>) -> CoreResult<Vec<Reservation>> {
    let sql = format!(
      "SELECT {} FROM reservations
       WHERE status = 'active'
         AND pickup_deadline IS NOT NULL
         AND pickup_deadline < ?1
       ORDER BY pickup_deadline, seq",
      RawReservation::COLUMNS
    );
    let raws = self.query_all(&sql, rusqlite::params![encode_dt(now)], RawReservation::from_row)?;
    decode_all(raws, RawReservation::into_reservation)
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

impl PolicyStore for SqliteUnit<'_> {
  fn current_settings(&mut self) -> CoreResult<Option<SettingsVersion>> {
    let sql = format!(
      "SELECT {} FROM settings ORDER BY version DESC LIMIT 1",
      RawSettings::COLUMNS
    );
    self
      .query_opt(&sql, rusqlite::params![], RawSettings::from_row)?
      .map(RawSettings::into_version)
      .transpose()
      .core()
  }

  fn insert_settings(
    &mut self,
    settings: &Settings,
    recorded_at: DateTime<Utc>,
  ) -> CoreResult<SettingsVersion> {
    let json = serde_json::to_string(settings)?;
    self.execute(
      "INSERT INTO settings (recorded_at, settings_json) VALUES (?1, ?2)",
      rusqlite::params![encode_dt(recorded_at), json],
    )?;
    Ok(SettingsVersion {
      version: self.conn.last_insert_rowid(),
      recorded_at,
      settings: settings.clone(),
    })
  }

  fn settings_history(&mut self) -> CoreResult<Vec<SettingsVersion>> {
    let sql = format!("SELECT {} FROM settings ORDER BY version", RawSettings::COLUMNS);
    let raws = self.query_all(&sql, rusqlite::params![], RawSettings::from_row)?;
    decode_all(raws, RawSettings::into_version)
  }

  fn list_holidays(&mut self) -> CoreResult<Vec<Holiday>> {
    let sql = format!("SELECT {} FROM holidays ORDER BY date, name", RawHoliday::COLUMNS);
    let raws = self.query_all(&sql, rusqlite::params![], RawHoliday::from_row)?;
    decode_all(raws, RawHoliday::into_holiday)
  }

  fn insert_holiday(&mut self, holiday: &Holiday) -> CoreResult<()> {
    self.execute(
      "INSERT INTO holidays (holiday_id, name, date, recurring, description)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        encode_uuid(holiday.holiday_id),
        holiday.name,
        encode_date(holiday.date),
        holiday.recurring,
        holiday.description,
      ],
    )?;
    Ok(())
  }

  fn delete_holiday_row(&mut self, holiday_id: Uuid) -> CoreResult<bool> {
    let changed = self.execute(
      "DELETE FROM holidays WHERE holiday_id = ?1",
      rusqlite::params![encode_uuid(holiday_id)],
    )?;
    Ok(changed > 0)
  }
}

// ─── Borrowers ───────────────────────────────────────────────────────────────

impl BorrowerRegistry for SqliteUnit<'_> {
  fn load_borrower(&mut self, borrower_id: Uuid) -> CoreResult<Option<Borrower>> {
    let sql = format!(
      "SELECT {} FROM borrowers WHERE borrower_id = ?1",
      RawBorrower::COLUMNS
    );
    self
      .query_opt(&sql, rusqlite::params![encode_uuid(borrower_id)], RawBorrower::from_row)?
      .map(RawBorrower::into_borrower)
      .transpose()
      .core()
  }

  fn save_borrower(&mut self, borrower: &Borrower) -> CoreResult<()> {
    self.execute(
      "INSERT INTO borrowers (borrower_id, role, registered_at) VALUES (?1, ?2, ?3)
       ON CONFLICT(borrower_id) DO UPDATE SET role = excluded.role",
      rusqlite::params![
        encode_uuid(borrower.borrower_id),
        encode_role(borrower.role),
        encode_dt(borrower.registered_at),
      ],
    )?;
    Ok(())
  }

  fn list_borrowers(&mut self) -> CoreResult<Vec<Borrower>> {
    let sql = format!(
      "SELECT {} FROM borrowers ORDER BY registered_at, borrower_id",
      RawBorrower::COLUMNS
    );
    let raws = self.query_all(&sql, rusqlite::params![], RawBorrower::from_row)?;
    decode_all(raws, RawBorrower::into_borrower)
  }
}
