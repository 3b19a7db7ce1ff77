use crate::domain::course::{CourseId, UserId};
use crate::domain::enrollment::Enrollment;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct PaymentRow<'a> {
    payment: PaymentId,
    user: &'a UserId,
    course: &'a CourseId,
    price: Decimal,
    original_price: Decimal,
    status: PaymentStatus,
}

#[derive(Serialize)]
struct EnrollmentRow<'a> {
    user: &'a UserId,
    course: &'a CourseId,
}

/// Writes the final ledger state as CSV: the payments table, a blank line,
/// then the enrollments table.
pub struct LedgerWriter<W: Write> {
    out: W,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_ledger(
        &mut self,
        mut payments: Vec<Payment>,
        mut enrollments: Vec<Enrollment>,
    ) -> Result<()> {
        payments.sort_by_key(|p| p.id);
        enrollments.sort_by(|a, b| a.user.cmp(&b.user).then_with(|| a.course.cmp(&b.course)));

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut self.out);
            writer.write_record(["payment", "user", "course", "price", "original_price", "status"])?;
            for p in &payments {
                writer.serialize(PaymentRow {
                    payment: p.id,
                    user: &p.user,
                    course: &p.course,
                    price: p.price.value().normalize(),
                    original_price: p.original_price.value().normalize(),
                    status: p.status,
                })?;
            }
            writer.flush()?;
        }

        writeln!(self.out)?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut self.out);
            writer.write_record(["user", "course"])?;
            for e in &enrollments {
                writer.serialize(EnrollmentRow {
                    user: &e.user,
                    course: &e.course,
                })?;
            }
            writer.flush()?;
        }

        Ok(())
    }
}
