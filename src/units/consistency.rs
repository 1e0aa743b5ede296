// Consistency and completion pass
//
// Runs once per record after every page has been merged:
// document-wide completion, date ordering, status inference and the
// vacant-tenant rule. Running it again on its own output changes nothing.

use super::fields::FieldExtractor;
use super::locator::Neighbours;
use crate::diagnostics::{Diagnostics, TraceEvent};
use crate::types::{DateField, UnitRecord, UnitType, VACANT_TENANT};

pub struct ConsistencyPass<'a> {
    extractor: &'a FieldExtractor,
}

impl<'a> ConsistencyPass<'a> {
    pub fn new(extractor: &'a FieldExtractor) -> Self {
        Self { extractor }
    }

    pub fn finalize(&self, units: &mut [UnitRecord], document_text: &str, diag: &mut Diagnostics) {
        let ids: Vec<String> = units.iter().map(|u| u.unit.clone()).collect();
        for unit in units.iter_mut() {
            let neighbours = Neighbours::new(&unit.unit, ids.iter().map(String::as_str));
            self.finalize_record(unit, document_text, &neighbours, diag);
        }
    }

    pub fn finalize_record(
        &self,
        unit: &mut UnitRecord,
        document_text: &str,
        neighbours: &Neighbours,
        diag: &mut Diagnostics,
    ) {
        self.complete(unit, document_text, neighbours, diag);
        unit.equalize_money();
        validate_dates(unit, diag);
        infer_status(unit, diag);
        if unit.unit_type == UnitType::Vacant {
            unit.tenant_name = VACANT_TENANT.to_string();
        }
    }

    /// Re-run rent and date strategies around every occurrence of the unit
    /// in the whole document when the local window came up empty. Each window
    /// is cut at the neighbouring identifiers.
    fn complete(&self, unit: &mut UnitRecord, document_text: &str, neighbours: &Neighbours, diag: &mut Diagnostics) {
        let config = &self.extractor.rules().config;

        if !unit.has_rent() && unit.total_amount <= 0.0 {
            if let Some(found) = self
                .extractor
                .search_rent(&unit.unit, document_text, config.completion_rent_radius, neighbours)
            {
                unit.rent = found.value;
                diag.record(TraceEvent::CompletionFilled {
                    unit: unit.unit.clone(),
                    field: "rent".to_string(),
                });
            }
        }

        if !unit.has_any_date() {
            if let Some(found) = self
                .extractor
                .search_dates(&unit.unit, document_text, config.completion_date_radius, neighbours)
            {
                for field in found.value.apply_to(unit) {
                    diag.record(TraceEvent::CompletionFilled {
                        unit: unit.unit.clone(),
                        field: field.as_str().to_string(),
                    });
                }
            }
        }
    }
}

/// Order both date pairs and mirror lease start with move-in.
pub fn validate_dates(unit: &mut UnitRecord, diag: &mut Diagnostics) {
    order_pairs(unit, diag);

    match (unit.lease_start, unit.move_in_date) {
        (Some(start), None) => unit.move_in_date = Some(start),
        (None, Some(move_in)) => unit.lease_start = Some(move_in),
        _ => {}
    }

    // Mirroring can put a start after an existing end
    order_pairs(unit, diag);
}

fn order_pairs(unit: &mut UnitRecord, diag: &mut Diagnostics) {
    for (first, second) in [
        (DateField::LeaseStart, DateField::LeaseEnd),
        (DateField::MoveIn, DateField::MoveOut),
    ] {
        if let (Some(a), Some(b)) = (unit.date(first), unit.date(second)) {
            if a > b {
                *unit.date_mut(first) = Some(b);
                *unit.date_mut(second) = Some(a);
                tracing::debug!(unit = %unit.unit, first = first.as_str(), "swapped reversed dates");
                diag.record(TraceEvent::DatesSwapped {
                    unit: unit.unit.clone(),
                    first: first.as_str().to_string(),
                    second: second.as_str().to_string(),
                });
            }
        }
    }
}

pub fn infer_status(unit: &mut UnitRecord, diag: &mut Diagnostics) {
    if unit.unit_type != UnitType::Unknown {
        return;
    }
    unit.unit_type = if unit.has_rent() && unit.has_tenant() {
        UnitType::Occupied
    } else {
        UnitType::Vacant
    };
    diag.record(TraceEvent::StatusInferred {
        unit: unit.unit.clone(),
        status: unit.unit_type,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(&PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_vacant_inferred_without_evidence() {
        let extractor = extractor();
        let pass = ConsistencyPass::new(&extractor);
        let mut diag = Diagnostics::new();

        let mut unit = UnitRecord::new("118");
        unit.tenant_name = VACANT_TENANT.to_string();
        pass.finalize_record(&mut unit, "118 VACANT", &Neighbours::default(), &mut diag);

        assert_eq!(unit.unit_type, UnitType::Vacant);
        assert_eq!(unit.tenant_name, VACANT_TENANT);
        assert!(diag
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::StatusInferred { status: UnitType::Vacant, .. })));
    }

    #[test]
    fn test_occupied_needs_rent_and_tenant() {
        let mut diag = Diagnostics::new();
        let mut unit = UnitRecord::new("104");
        unit.rent = 1200.0;
        unit.tenant_name = "Perez, Ana".to_string();
        infer_status(&mut unit, &mut diag);
        assert_eq!(unit.unit_type, UnitType::Occupied);

        let mut no_tenant = UnitRecord::new("106");
        no_tenant.rent = 1200.0;
        infer_status(&mut no_tenant, &mut diag);
        assert_eq!(no_tenant.unit_type, UnitType::Vacant);
    }

    #[test]
    fn test_reversed_dates_swapped_and_mirrored() {
        let mut diag = Diagnostics::new();
        let mut unit = UnitRecord::new("201");
        unit.lease_start = d(2025, 1, 31);
        unit.lease_end = d(2024, 2, 1);

        validate_dates(&mut unit, &mut diag);

        assert_eq!(unit.lease_start, d(2024, 2, 1));
        assert_eq!(unit.lease_end, d(2025, 1, 31));
        assert_eq!(unit.move_in_date, d(2024, 2, 1));
        assert!(diag
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::DatesSwapped { first, .. } if first == "lease_start")));
    }

    #[test]
    fn test_reversed_move_dates_swapped() {
        let mut diag = Diagnostics::new();
        let mut unit = UnitRecord::new("206");
        unit.move_in_date = d(2024, 6, 1);
        unit.move_out_date = d(2023, 6, 1);

        validate_dates(&mut unit, &mut diag);

        assert_eq!(unit.move_in_date, d(2023, 6, 1));
        assert_eq!(unit.move_out_date, d(2024, 6, 1));
        assert_eq!(unit.lease_start, d(2023, 6, 1));
        assert!(diag
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::DatesSwapped { first, .. } if first == "move_in_date")));
    }

    #[test]
    fn test_mirrored_start_reordered() {
        let mut diag = Diagnostics::new();
        let mut unit = UnitRecord::new("202");
        unit.lease_end = d(2024, 1, 1);
        unit.move_in_date = d(2024, 3, 1);

        validate_dates(&mut unit, &mut diag);

        assert_eq!(unit.lease_start, d(2024, 1, 1));
        assert_eq!(unit.lease_end, d(2024, 3, 1));
        assert!(unit.lease_start <= unit.lease_end);
    }

    #[test]
    fn test_completion_searches_whole_document() {
        let extractor = extractor();
        let pass = ConsistencyPass::new(&extractor);
        let mut diag = Diagnostics::new();

        let document = "Rent Roll\n203 Occupied Reyes, Carmen\n\nCharges\n203 Rent $1,380.00 3/1/2024 2/28/2025";
        let mut unit = UnitRecord::new("203");
        unit.unit_type = UnitType::Occupied;
        unit.tenant_name = "Reyes, Carmen".to_string();
        pass.finalize_record(&mut unit, document, &Neighbours::default(), &mut diag);

        assert_eq!(unit.rent, 1380.0);
        assert_eq!(unit.total_amount, 1380.0);
        assert_eq!(unit.lease_start, d(2024, 3, 1));
        assert_eq!(unit.lease_end, d(2025, 2, 28));
        assert_eq!(unit.move_in_date, d(2024, 3, 1));
    }

    #[test]
    fn test_completion_stays_inside_own_row() {
        let extractor = extractor();
        let pass = ConsistencyPass::new(&extractor);
        let mut diag = Diagnostics::new();

        let document = "102 Vacant\n103 Occupied Ibarra, Luz $1,400.00 4/1/2024 3/31/2025";
        let mut units = vec![UnitRecord::new("102"), UnitRecord::new("103")];
        units[0].unit_type = UnitType::Vacant;
        pass.finalize(&mut units, document, &mut diag);

        assert_eq!(units[0].rent, 0.0);
        assert_eq!(units[0].lease_start, None);
        assert_eq!(units[0].tenant_name, VACANT_TENANT);
        assert_eq!(units[1].rent, 1400.0);
        assert_eq!(units[1].lease_start, d(2024, 4, 1));
    }

    #[test]
    fn test_pass_is_idempotent() {
        let extractor = extractor();
        let pass = ConsistencyPass::new(&extractor);
        let mut diag = Diagnostics::new();
        let document = "205 Rent $1,100.00 9/1/2024 8/31/2023";

        let mut units = vec![UnitRecord::new("205"), UnitRecord::new("206")];
        units[1].move_in_date = d(2024, 6, 1);
        units[1].move_out_date = d(2023, 6, 1);

        pass.finalize(&mut units, document, &mut diag);
        let once = units.clone();
        pass.finalize(&mut units, document, &mut diag);

        assert_eq!(units, once);
    }
}
