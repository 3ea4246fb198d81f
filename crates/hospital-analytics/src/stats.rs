//! Aggregations over records fetched from the hospital API.
//!
//! The row types only name the fields the aggregations read; anything else in
//! the upstream payload (including `_links`) is ignored.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

pub const MOST_PRESCRIBED_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientRow {
    #[serde(default)]
    pub age: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitRow {
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default)]
    pub visit_date: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionRow {
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default)]
    pub drug_name: Option<String>,
    #[serde(default)]
    pub duration: Option<DurationField>,
}

/// A prescription duration: a day count, or free text such as `"7 days"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationField {
    Days(i64),
    Text(String),
}

impl DurationField {
    /// Free text yields the number formed by all of its digits.
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Days(days) => Some(*days),
            Self::Text(text) => {
                let digits: String = text.chars().filter(char::is_ascii_digit).collect();
                digits.parse().ok()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientStats {
    pub total_patients: usize,
    pub average_age: f64,
    pub age_distribution: IndexMap<&'static str, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitTrends {
    pub daily_visits: BTreeMap<String, u64>,
    pub total_visits: u64,
    pub average_daily_visits: f64,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrescriptionAnalysis {
    pub total_prescriptions: usize,
    pub unique_drugs: usize,
    pub most_prescribed_drugs: IndexMap<String, u64>,
    pub duration_analysis: IndexMap<&'static str, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorStats {
    pub name: String,
    pub visits: u64,
    pub prescriptions: u64,
    pub diagnoses: IndexSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorWorkload {
    pub total_doctors: usize,
    pub doctor_stats: BTreeMap<i64, DoctorStats>,
}

const AGE_BUCKETS: [&str; 5] = ["0-18", "19-30", "31-50", "51-70", "70+"];
const DURATION_BUCKETS: [&str; 4] = ["1-3 days", "4-7 days", "8-14 days", "15+ days"];

fn zeroed(buckets: &[&'static str]) -> IndexMap<&'static str, u64> {
    buckets.iter().map(|b| (*b, 0)).collect()
}

fn age_bucket(age: f64) -> &'static str {
    if age <= 18.0 {
        "0-18"
    } else if age <= 30.0 {
        "19-30"
    } else if age <= 50.0 {
        "31-50"
    } else if age <= 70.0 {
        "51-70"
    } else {
        "70+"
    }
}

fn duration_bucket(days: i64) -> &'static str {
    if days <= 3 {
        "1-3 days"
    } else if days <= 7 {
        "4-7 days"
    } else if days <= 14 {
        "8-14 days"
    } else {
        "15+ days"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Patients without an age count towards the total only.
pub fn patient_stats(patients: &[PatientRow]) -> PatientStats {
    let ages: Vec<f64> = patients.iter().filter_map(|p| p.age).collect();
    let average_age = if ages.is_empty() {
        0.0
    } else {
        round2(ages.iter().sum::<f64>() / ages.len() as f64)
    };

    let mut age_distribution = zeroed(&AGE_BUCKETS);
    for age in &ages {
        *age_distribution.entry(age_bucket(*age)).or_insert(0) += 1;
    }

    PatientStats {
        total_patients: patients.len(),
        average_age,
        age_distribution,
    }
}

/// Accepts RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS.ffffff` ones.
pub fn parse_visit_date(raw: &str) -> Option<Date> {
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt.date());
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    PrimitiveDateTime::parse(raw, naive).ok().map(|dt| dt.date())
}

/// Counts visits per calendar day. Every visit with a parsable date is
/// counted; `days` only sets the divisor and the period label.
pub fn visit_trends(visits: &[VisitRow], days: u32) -> VisitTrends {
    let mut daily_visits: BTreeMap<String, u64> = BTreeMap::new();
    for visit in visits {
        let Some(raw) = visit.visit_date.as_deref() else {
            continue;
        };
        match parse_visit_date(raw) {
            Some(date) => *daily_visits.entry(date.to_string()).or_insert(0) += 1,
            None => tracing::debug!(visit_date = raw, "skipping unparsable visit date"),
        }
    }

    let total_visits: u64 = daily_visits.values().sum();
    let average_daily_visits = if days == 0 {
        0.0
    } else {
        total_visits as f64 / f64::from(days)
    };

    VisitTrends {
        daily_visits,
        total_visits,
        average_daily_visits,
        period: format!("Last {days} days"),
    }
}

pub fn prescription_analysis(prescriptions: &[PrescriptionRow]) -> PrescriptionAnalysis {
    let mut drug_usage: IndexMap<String, u64> = IndexMap::new();
    let mut duration_analysis = zeroed(&DURATION_BUCKETS);

    for prescription in prescriptions {
        if let Some(drug) = prescription.drug_name.as_deref().map(str::trim)
            && !drug.is_empty()
        {
            *drug_usage.entry(drug.to_string()).or_insert(0) += 1;
        }
        if let Some(days) = prescription.duration.as_ref().and_then(DurationField::days) {
            *duration_analysis.entry(duration_bucket(days)).or_insert(0) += 1;
        }
    }

    // Stable sort: equally used drugs keep first-seen order.
    let mut ranked: Vec<(&String, &u64)> = drug_usage.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1));
    let most_prescribed_drugs = ranked
        .into_iter()
        .take(MOST_PRESCRIBED_LIMIT)
        .map(|(drug, count)| (drug.clone(), *count))
        .collect();

    PrescriptionAnalysis {
        total_prescriptions: prescriptions.len(),
        unique_drugs: drug_usage.len(),
        most_prescribed_drugs,
        duration_analysis,
    }
}

/// Doctors are discovered from visits. Prescriptions are attributed only to
/// doctors that have at least one visit; `None` leaves prescription counts
/// at zero.
pub fn doctor_workload(
    visits: &[VisitRow],
    prescriptions: Option<&[PrescriptionRow]>,
) -> DoctorWorkload {
    let mut doctor_stats: BTreeMap<i64, DoctorStats> = BTreeMap::new();

    for visit in visits {
        let Some(doctor_id) = visit.doctor_id.filter(|id| *id != 0) else {
            continue;
        };
        let stats = doctor_stats.entry(doctor_id).or_insert_with(|| DoctorStats {
            name: format!("Doctor {doctor_id}"),
            visits: 0,
            prescriptions: 0,
            diagnoses: IndexSet::new(),
        });
        stats.visits += 1;
        if let Some(diagnosis) = visit.diagnosis.as_deref()
            && !diagnosis.is_empty()
        {
            stats.diagnoses.insert(diagnosis.to_string());
        }
    }

    for prescription in prescriptions.unwrap_or_default() {
        if let Some(stats) = prescription
            .doctor_id
            .and_then(|id| doctor_stats.get_mut(&id))
        {
            stats.prescriptions += 1;
        }
    }

    DoctorWorkload {
        total_doctors: doctor_stats.len(),
        doctor_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(age: Option<f64>) -> PatientRow {
        PatientRow { age }
    }

    fn visit(doctor_id: i64, date: &str, diagnosis: Option<&str>) -> VisitRow {
        VisitRow {
            doctor_id: Some(doctor_id),
            visit_date: Some(date.to_string()),
            diagnosis: diagnosis.map(str::to_string),
        }
    }

    fn prescription(doctor_id: i64, drug: &str, duration: DurationField) -> PrescriptionRow {
        PrescriptionRow {
            doctor_id: Some(doctor_id),
            drug_name: Some(drug.to_string()),
            duration: Some(duration),
        }
    }

    #[test]
    fn patient_stats_buckets_and_average() {
        let stats = patient_stats(&[
            patient(Some(18.0)),
            patient(Some(19.0)),
            patient(Some(45.0)),
            patient(Some(70.0)),
            patient(Some(71.0)),
            patient(None),
        ]);
        assert_eq!(stats.total_patients, 6);
        // (18 + 19 + 45 + 70 + 71) / 5
        assert_eq!(stats.average_age, 44.6);
        assert_eq!(
            stats
                .age_distribution
                .iter()
                .map(|(bucket, n)| (*bucket, *n))
                .collect::<Vec<(&str, u64)>>(),
            vec![
                ("0-18", 1),
                ("19-30", 1),
                ("31-50", 1),
                ("51-70", 1),
                ("70+", 1)
            ]
        );
    }

    #[test]
    fn patient_stats_average_is_rounded() {
        let stats = patient_stats(&[patient(Some(20.0)), patient(Some(21.0)), patient(Some(21.0))]);
        assert_eq!(stats.average_age, 20.67);
    }

    #[test]
    fn patient_stats_empty() {
        let stats = patient_stats(&[]);
        assert_eq!(stats.total_patients, 0);
        assert_eq!(stats.average_age, 0.0);
        assert!(stats.age_distribution.values().all(|n| *n == 0));
        assert_eq!(stats.age_distribution.len(), 5);
    }

    #[test]
    fn visit_dates_in_both_formats() {
        let date = parse_visit_date("2024-03-01T09:15:00Z").unwrap();
        assert_eq!(date.to_string(), "2024-03-01");
        let date = parse_visit_date("2024-03-02T23:59:59.123456").unwrap();
        assert_eq!(date.to_string(), "2024-03-02");
        assert!(parse_visit_date("yesterday").is_none());
    }

    #[test]
    fn visit_trends_counts_per_day_and_skips_bad_dates() {
        let visits = vec![
            visit(1, "2024-03-01T09:00:00Z", None),
            visit(1, "2024-03-01T15:30:00Z", None),
            visit(2, "2024-03-03T08:00:00+02:00", None),
            visit(2, "not a date", None),
            VisitRow::default(),
        ];
        let trends = visit_trends(&visits, 4);
        assert_eq!(trends.total_visits, 3);
        assert_eq!(trends.daily_visits.get("2024-03-01"), Some(&2));
        assert_eq!(trends.daily_visits.get("2024-03-03"), Some(&1));
        assert_eq!(trends.average_daily_visits, 0.75);
        assert_eq!(trends.period, "Last 4 days");
    }

    #[test]
    fn durations_from_numbers_and_text() {
        assert_eq!(DurationField::Days(10).days(), Some(10));
        assert_eq!(DurationField::Text("7 days".into()).days(), Some(7));
        assert_eq!(DurationField::Text("1 to 2 weeks".into()).days(), Some(12));
        assert_eq!(DurationField::Text("as needed".into()).days(), None);
    }

    #[test]
    fn prescription_analysis_ranks_and_buckets() {
        let mut rows = vec![
            prescription(1, "Aspirin", DurationField::Days(3)),
            prescription(1, " Aspirin ", DurationField::Days(5)),
            prescription(1, "Ibuprofen", DurationField::Text("10 days".into())),
            prescription(2, "Metformin", DurationField::Days(30)),
            prescription(2, "Metformin", DurationField::Days(30)),
            prescription(2, "Metformin", DurationField::Days(30)),
            prescription(2, "", DurationField::Text("n/a".into())),
        ];
        for drug in ["Lisinopril", "Atorvastatin", "Omeprazole"] {
            rows.push(prescription(3, drug, DurationField::Days(1)));
        }

        let analysis = prescription_analysis(&rows);
        assert_eq!(analysis.total_prescriptions, 10);
        assert_eq!(analysis.unique_drugs, 6);

        let top: Vec<(&str, u64)> = analysis
            .most_prescribed_drugs
            .iter()
            .map(|(d, n)| (d.as_str(), *n))
            .collect();
        assert_eq!(
            top,
            vec![
                ("Metformin", 3),
                ("Aspirin", 2),
                ("Ibuprofen", 1),
                ("Lisinopril", 1),
                ("Atorvastatin", 1),
            ]
        );

        assert_eq!(analysis.duration_analysis["1-3 days"], 4);
        assert_eq!(analysis.duration_analysis["4-7 days"], 1);
        assert_eq!(analysis.duration_analysis["8-14 days"], 1);
        assert_eq!(analysis.duration_analysis["15+ days"], 3);
    }

    #[test]
    fn doctor_workload_attributes_prescriptions_to_known_doctors() {
        let visits = vec![
            visit(1, "2024-03-01T09:00:00Z", Some("Flu")),
            visit(1, "2024-03-02T09:00:00Z", Some("Flu")),
            visit(1, "2024-03-03T09:00:00Z", Some("Migraine")),
            visit(2, "2024-03-04T09:00:00Z", None),
        ];
        let prescriptions = vec![
            prescription(1, "Aspirin", DurationField::Days(3)),
            prescription(2, "Ibuprofen", DurationField::Days(3)),
            prescription(2, "Ibuprofen", DurationField::Days(3)),
            prescription(9, "Metformin", DurationField::Days(3)),
        ];

        let workload = doctor_workload(&visits, Some(&prescriptions));
        assert_eq!(workload.total_doctors, 2);

        let first = &workload.doctor_stats[&1];
        assert_eq!(first.name, "Doctor 1");
        assert_eq!(first.visits, 3);
        assert_eq!(first.prescriptions, 1);
        assert_eq!(
            first.diagnoses.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["Flu", "Migraine"]
        );

        let second = &workload.doctor_stats[&2];
        assert_eq!(second.prescriptions, 2);
        assert!(second.diagnoses.is_empty());
        assert!(!workload.doctor_stats.contains_key(&9));
    }

    #[test]
    fn doctor_workload_without_prescriptions() {
        let visits = vec![visit(4, "2024-03-01T09:00:00Z", Some("Checkup"))];
        let workload = doctor_workload(&visits, None);
        assert_eq!(workload.doctor_stats[&4].visits, 1);
        assert_eq!(workload.doctor_stats[&4].prescriptions, 0);
    }

    #[test]
    fn rows_ignore_unknown_fields() {
        let row: VisitRow = serde_json::from_value(serde_json::json!({
            "id": 3,
            "patient_id": 1,
            "doctor_id": 2,
            "visit_date": "2024-03-01T09:00:00Z",
            "diagnosis": null,
            "_links": {"self": {"href": "/visits/3"}}
        }))
        .unwrap();
        assert_eq!(row.doctor_id, Some(2));
        assert!(row.diagnosis.is_none());

        let row: PrescriptionRow =
            serde_json::from_value(serde_json::json!({"drug_name": "X", "duration": "5 days"}))
                .unwrap();
        assert_eq!(row.duration, Some(DurationField::Text("5 days".into())));
    }
}
