//! Per-student application status lookups across three payout datasets.
//!
//! Each dataset has its own column layout, header-row count, and matching
//! rule. Matching is strict (normalized student number) where the dataset
//! has a reliable identifier column, with a loose name-containment fallback
//! only where it does not. A matched row's free-text status cell is
//! classified through disjoint keyword sets; an unmatched identifier is
//! "not submitted", which is never the same thing as "pending".

use std::sync::Arc;

use tokio::time::Duration;
use tracing::{info, warn};

use crate::error::SheetsError;
use crate::status::cache::TtlCache;
use crate::status::sheets::{DatasetSource, ValuesFetcher};

const MATERIAL_AID: DatasetSource = DatasetSource {
    sheet_id: "117QNcwjcsQ1ScFlTbOm6oOcPlXiMefR8rNgb15dA8Ms",
    sheet_name: "осень 2025",
    range: "A:F",
    header_rows: 4,
};

const TRAVEL_COMPENSATION: DatasetSource = DatasetSource {
    sheet_id: "18NYYQNvdJINpUXvoPH1_MHqldH4GfgdWEPrGqMkPtUU",
    sheet_name: "осень 2025",
    range: "A:E",
    header_rows: 8,
};

const HOUSING_COMPENSATION: DatasetSource = DatasetSource {
    sheet_id: "1gmM_hJocQ1tfz5Pzu8SNhvt-s1u739sJgVKjFCXVETs",
    sheet_name: "осень 2025",
    range: "A:D",
    header_rows: 4,
};

const REJECTED_MARKERS: &[&str] = &["отклонено", "не может", "невозможно"];
const APPROVED_MARKERS: &[&str] = &["одобрено", "выплачено", "выплачена", "согласовано"];
/// Extra approval wording seen only in the housing dataset.
const HOUSING_APPROVED_MARKERS: &[&str] = &["допущена", "принято"];
/// Extra rejection wording seen only in the travel dataset.
const TRAVEL_REJECTED_MARKERS: &[&str] = &["нет подтверждения", "недействительно"];

/// Who to look for.
#[derive(Debug, Clone)]
pub struct StudentRef {
    pub student_number: String,
    pub last_name: String,
    pub first_name: String,
}

impl StudentRef {
    fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.student_number, self.last_name, self.first_name)
    }
}

/// Outcome classes for a matched row's status cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Approved,
    Rejected,
    Pending,
    Unknown,
}

/// Status of one dataset for one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetStatus {
    /// A row matched; its status cell classified, with display text.
    Classified { class: Classification, text: String },
    /// No row matched the identifier — the application was never submitted.
    NotSubmitted,
    /// The dataset could not be fetched; only this dataset degrades.
    Unavailable,
}

impl DatasetStatus {
    fn classified(class: Classification, text: impl Into<String>) -> Self {
        DatasetStatus::Classified { class, text: text.into() }
    }
}

/// Statuses across all three datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub material_aid: DatasetStatus,
    pub travel_compensation: DatasetStatus,
    pub housing_compensation: DatasetStatus,
}

impl StatusReport {
    pub fn has_unavailable(&self) -> bool {
        [&self.material_aid, &self.travel_compensation, &self.housing_compensation]
            .iter()
            .any(|s| matches!(s, DatasetStatus::Unavailable))
    }
}

/// TTL-cached status lookups over a `ValuesFetcher`.
pub struct StatusChecker {
    fetcher: Arc<dyn ValuesFetcher>,
    reports: TtlCache<StatusReport>,
    sheets: TtlCache<Vec<Vec<String>>>,
}

impl StatusChecker {
    pub fn new(fetcher: Arc<dyn ValuesFetcher>, report_ttl: Duration, sheet_ttl: Duration) -> Self {
        Self {
            fetcher,
            reports: TtlCache::new(report_ttl),
            sheets: TtlCache::new(sheet_ttl),
        }
    }

    /// Cached report while fresh; otherwise fetch, classify, and cache.
    /// Reports carrying an unavailable dataset are returned but never
    /// cached, so the next call retries instead of pinning the error.
    pub async fn get_or_fetch(&self, student: &StudentRef) -> StatusReport {
        let key = student.cache_key();
        if let Some(report) = self.reports.get(&key).await {
            info!(student = %student.student_number, "Status report served from cache");
            return report;
        }

        let report = self.check(student).await;
        if !report.has_unavailable() {
            self.reports.insert(key, report.clone()).await;
        }
        report
    }

    /// Full invalidation of both cache layers. Operational tooling only.
    pub async fn clear_cache(&self) {
        self.reports.clear().await;
        self.sheets.clear().await;
    }

    async fn check(&self, student: &StudentRef) -> StatusReport {
        StatusReport {
            material_aid: self
                .dataset_status(&MATERIAL_AID, "material_aid", |rows| {
                    check_material_aid(rows, &student.student_number)
                })
                .await,
            travel_compensation: self
                .dataset_status(&TRAVEL_COMPENSATION, "travel_compensation", |rows| {
                    check_travel_compensation(rows, &student.student_number, &student.last_name)
                })
                .await,
            housing_compensation: self
                .dataset_status(&HOUSING_COMPENSATION, "housing_compensation", |rows| {
                    check_housing_compensation(rows, &student.last_name, &student.first_name)
                })
                .await,
        }
    }

    async fn dataset_status<F>(
        &self,
        source: &DatasetSource,
        cache_key: &str,
        match_rows: F,
    ) -> DatasetStatus
    where
        F: FnOnce(&[Vec<String>]) -> DatasetStatus,
    {
        match self.rows(source, cache_key).await {
            Ok(rows) => {
                let data = rows.get(source.header_rows..).unwrap_or(&[]);
                match_rows(data)
            }
            Err(e) => {
                warn!(dataset = cache_key, error = %e, "Dataset fetch failed");
                DatasetStatus::Unavailable
            }
        }
    }

    /// Raw rows for a dataset, cached separately from assembled reports.
    /// Fetch failures are returned without a cache write.
    async fn rows(
        &self,
        source: &DatasetSource,
        cache_key: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        if let Some(rows) = self.sheets.get(cache_key).await {
            return Ok(rows);
        }
        let rows = self.fetcher.fetch_values(source).await?;
        self.sheets.insert(cache_key, rows.clone()).await;
        Ok(rows)
    }
}

// ── Matching and classification ─────────────────────────────────────

/// Normalized identifier: uppercased, all whitespace stripped.
fn normalize_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn cell<'a>(row: &'a [String], idx: usize) -> &'a str {
    row.get(idx).map(String::as_str).unwrap_or("").trim()
}

/// Keyword classification over disjoint marker sets. Rejection wins over
/// approval only because the sets never overlap.
fn classify_text(text: &str, extra_approved: &[&str], extra_rejected: &[&str]) -> Classification {
    let lower = text.to_lowercase();
    if REJECTED_MARKERS.iter().chain(extra_rejected).any(|m| lower.contains(m)) {
        return Classification::Rejected;
    }
    if APPROVED_MARKERS.iter().chain(extra_approved).any(|m| lower.contains(m)) {
        return Classification::Approved;
    }
    Classification::Pending
}

/// Material aid: strict match on the student-number column only.
fn check_material_aid(rows: &[Vec<String>], student_number: &str) -> DatasetStatus {
    let wanted = normalize_id(student_number);
    if wanted.is_empty() {
        return DatasetStatus::NotSubmitted;
    }

    for row in rows {
        if normalize_id(cell(row, 2)) == wanted {
            return parse_material_aid_row(row);
        }
    }
    DatasetStatus::NotSubmitted
}

/// Status lives across columns D and E; both are shown when present.
fn parse_material_aid_row(row: &[String]) -> DatasetStatus {
    let main = cell(row, 3);
    let extra = cell(row, 4);

    // An empty status cell here means the application is still in review.
    if main.is_empty() && extra.is_empty() {
        return DatasetStatus::classified(Classification::Pending, "⏳ На рассмотрении");
    }

    let combined = if extra.is_empty() {
        main.to_string()
    } else if main.is_empty() {
        extra.to_string()
    } else {
        format!("{main}, {extra}")
    };

    match classify_text(&combined, &[], &[]) {
        Classification::Approved => {
            DatasetStatus::classified(Classification::Approved, format!("✅ {combined}"))
        }
        Classification::Rejected => {
            DatasetStatus::classified(Classification::Rejected, format!("❌ {combined}"))
        }
        _ => DatasetStatus::classified(Classification::Pending, format!("ℹ️ {combined}")),
    }
}

/// Travel compensation: strict student-number match with a loose last-name
/// fallback (this dataset's identifier column is unreliable).
fn check_travel_compensation(
    rows: &[Vec<String>],
    student_number: &str,
    last_name: &str,
) -> DatasetStatus {
    let wanted = normalize_id(student_number);
    if !wanted.is_empty() {
        for row in rows {
            if normalize_id(cell(row, 1)) == wanted {
                return parse_travel_row(row);
            }
        }
    }

    let last_lower = last_name.trim().to_lowercase();
    if !last_lower.is_empty() {
        for row in rows {
            if cell(row, 0).to_lowercase().contains(&last_lower) {
                return parse_travel_row(row);
            }
        }
    }

    DatasetStatus::NotSubmitted
}

fn parse_travel_row(row: &[String]) -> DatasetStatus {
    if row.len() < 4 {
        return DatasetStatus::classified(Classification::Unknown, "Данные неполные");
    }

    let status_code = cell(row, 3);
    let comment = cell(row, 4);
    let with_comment = |text: String| {
        if comment.is_empty() || comment == "." {
            text
        } else {
            format!("{text}\n💬 {comment}")
        }
    };

    // Numeric codes predate the free-text statuses in this dataset.
    match status_code {
        "1" => {
            return DatasetStatus::classified(
                Classification::Approved,
                with_comment("✅ Одобрено".into()),
            );
        }
        "2" => {
            return DatasetStatus::classified(
                Classification::Pending,
                with_comment("⏳ Нужны документы".into()),
            );
        }
        _ => {}
    }

    match classify_text(status_code, &[], TRAVEL_REJECTED_MARKERS) {
        Classification::Rejected => DatasetStatus::classified(
            Classification::Rejected,
            with_comment(format!("❌ {status_code}")),
        ),
        Classification::Approved => DatasetStatus::classified(
            Classification::Approved,
            with_comment(format!("✅ {status_code}")),
        ),
        _ => DatasetStatus::classified(
            Classification::Pending,
            with_comment(format!("ℹ️ {status_code}")),
        ),
    }
}

/// Housing compensation: no identifier column at all — loose containment
/// match on "Lastname F." against the name cell.
fn check_housing_compensation(
    rows: &[Vec<String>],
    last_name: &str,
    first_name: &str,
) -> DatasetStatus {
    let last = last_name.trim();
    if last.is_empty() {
        return DatasetStatus::NotSubmitted;
    }
    let pattern = match first_name.trim().chars().next() {
        Some(initial) => format!("{last} {initial}.").to_lowercase(),
        None => last.to_lowercase(),
    };

    for row in rows {
        let name = cell(row, 1).to_lowercase();
        if name.is_empty() {
            continue;
        }
        if name.contains(&pattern) || pattern.contains(&name) {
            return parse_housing_row(row);
        }
    }
    DatasetStatus::NotSubmitted
}

fn parse_housing_row(row: &[String]) -> DatasetStatus {
    if row.len() < 2 {
        return DatasetStatus::classified(Classification::Unknown, "Данные неполные");
    }

    let status_text = cell(row, 3);

    // Dataset-specific rule: an empty status cell means the application was
    // accepted. Deliberate; do not "fix".
    if status_text.is_empty() {
        return DatasetStatus::classified(Classification::Approved, "✅ Принято");
    }

    match classify_text(status_text, HOUSING_APPROVED_MARKERS, &[]) {
        Classification::Approved => {
            DatasetStatus::classified(Classification::Approved, format!("✅ {status_text}"))
        }
        Classification::Rejected => {
            DatasetStatus::classified(Classification::Rejected, format!("❌ {status_text}"))
        }
        _ => DatasetStatus::classified(Classification::Pending, format!("ℹ️ {status_text}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn class_of(status: &DatasetStatus) -> Option<Classification> {
        match status {
            DatasetStatus::Classified { class, .. } => Some(*class),
            _ => None,
        }
    }

    fn text_of(status: &DatasetStatus) -> &str {
        match status {
            DatasetStatus::Classified { text, .. } => text,
            _ => panic!("expected classified status, got {status:?}"),
        }
    }

    #[test]
    fn material_aid_classifies_by_keywords() {
        let rows = vec![
            row(&["Иванов", "ИВТ-21", "12345", "Одобрено", "выплачено 5000"]),
            row(&["Петров", "ИВТ-22", "54321", "Отклонено, нет документов", ""]),
            row(&["Сидоров", "ИВТ-23", "99999", "", ""]),
        ];

        let approved = check_material_aid(&rows, "12345");
        assert_eq!(class_of(&approved), Some(Classification::Approved));
        assert!(text_of(&approved).contains("выплачено 5000"));

        let rejected = check_material_aid(&rows, "54321");
        assert_eq!(class_of(&rejected), Some(Classification::Rejected));

        let pending = check_material_aid(&rows, "99999");
        assert_eq!(class_of(&pending), Some(Classification::Pending));
        assert!(text_of(&pending).contains("На рассмотрении"));

        assert_eq!(check_material_aid(&rows, "00000"), DatasetStatus::NotSubmitted);
    }

    #[test]
    fn material_aid_matches_normalized_numbers() {
        let rows = vec![row(&["Иванов", "ИВТ-21", " см 12 345 ", "Согласовано", ""])];
        let status = check_material_aid(&rows, "СМ12345");
        assert_eq!(class_of(&status), Some(Classification::Approved));
    }

    #[test]
    fn travel_numeric_codes_and_comments() {
        let rows = vec![
            row(&["Иванов И.И.", "111", "", "1", "ведомость №3"]),
            row(&["Петров П.П.", "222", "", "2", "."]),
            row(&["Сидоров С.С.", "333", "", "нет подтверждения оплаты", ""]),
        ];

        let approved = check_travel_compensation(&rows, "111", "Иванов");
        assert_eq!(class_of(&approved), Some(Classification::Approved));
        assert!(text_of(&approved).contains("💬 ведомость №3"));

        // A lone "." in the comment cell is a filler, not a comment.
        let pending = check_travel_compensation(&rows, "222", "Петров");
        assert_eq!(class_of(&pending), Some(Classification::Pending));
        assert!(!text_of(&pending).contains('💬'));

        let rejected = check_travel_compensation(&rows, "333", "Сидоров");
        assert_eq!(class_of(&rejected), Some(Classification::Rejected));
    }

    #[test]
    fn travel_falls_back_to_last_name() {
        let rows = vec![row(&["Иванов Иван Иванович", "", "", "1", ""])];
        // No student number on the row; the name column still matches.
        let status = check_travel_compensation(&rows, "12345", "Иванов");
        assert_eq!(class_of(&status), Some(Classification::Approved));

        assert_eq!(
            check_travel_compensation(&rows, "12345", "Кузнецов"),
            DatasetStatus::NotSubmitted
        );
    }

    #[test]
    fn housing_empty_status_means_accepted() {
        let rows = vec![
            row(&["1", "Иванова И.С.", "общ. 4", ""]),
            row(&["2", "Петрова А.А.", "общ. 2", "отклонено"]),
            row(&["3", "Сидорова К.К.", "общ. 1", "допущена к заселению"]),
        ];

        let accepted = check_housing_compensation(&rows, "Иванова", "Ирина");
        assert_eq!(class_of(&accepted), Some(Classification::Approved));
        assert_eq!(text_of(&accepted), "✅ Принято");

        let rejected = check_housing_compensation(&rows, "Петрова", "Анна");
        assert_eq!(class_of(&rejected), Some(Classification::Rejected));

        let approved = check_housing_compensation(&rows, "Сидорова", "Ксения");
        assert_eq!(class_of(&approved), Some(Classification::Approved));

        assert_eq!(
            check_housing_compensation(&rows, "Кузнецова", "Ольга"),
            DatasetStatus::NotSubmitted
        );
    }

    struct FakeFetcher {
        fetches: AtomicUsize,
        fail_sheet: Option<&'static str>,
        rows: HashMap<&'static str, Vec<Vec<String>>>,
    }

    impl FakeFetcher {
        fn new(fail_sheet: Option<&'static str>) -> Arc<Self> {
            let mut rows = HashMap::new();
            let mut material = vec![row(&[""]); MATERIAL_AID.header_rows];
            material.push(row(&["Иванов", "ИВТ-21", "12345", "Одобрено", ""]));
            rows.insert(MATERIAL_AID.sheet_id, material);

            let mut travel = vec![row(&[""]); TRAVEL_COMPENSATION.header_rows];
            travel.push(row(&["Иванов И.И.", "12345", "", "1", ""]));
            rows.insert(TRAVEL_COMPENSATION.sheet_id, travel);

            let mut housing = vec![row(&[""]); HOUSING_COMPENSATION.header_rows];
            housing.push(row(&["1", "Иванов И.", "общ. 4", ""]));
            rows.insert(HOUSING_COMPENSATION.sheet_id, housing);

            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                fail_sheet,
                rows,
            })
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ValuesFetcher for FakeFetcher {
        async fn fetch_values(
            &self,
            source: &DatasetSource,
        ) -> Result<Vec<Vec<String>>, SheetsError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_sheet == Some(source.sheet_id) {
                return Err(SheetsError::Http("connection reset".into()));
            }
            Ok(self.rows.get(source.sheet_id).cloned().unwrap_or_default())
        }
    }

    fn student() -> StudentRef {
        StudentRef {
            student_number: "12345".into(),
            last_name: "Иванов".into(),
            first_name: "Иван".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn report_is_cached_within_ttl() {
        let fetcher = FakeFetcher::new(None);
        let checker = StatusChecker::new(
            fetcher.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(1800),
        );

        let first = checker.get_or_fetch(&student()).await;
        assert_eq!(class_of(&first.material_aid), Some(Classification::Approved));
        assert_eq!(fetcher.fetch_count(), 3);

        let second = checker.get_or_fetch(&student()).await;
        assert_eq!(first, second);
        assert_eq!(fetcher.fetch_count(), 3);

        tokio::time::advance(Duration::from_secs(3601)).await;
        checker.get_or_fetch(&student()).await;
        assert_eq!(fetcher.fetch_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dataset_degrades_alone_and_is_not_cached() {
        let fetcher = FakeFetcher::new(Some(TRAVEL_COMPENSATION.sheet_id));
        let checker = StatusChecker::new(
            fetcher.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(1800),
        );

        let report = checker.get_or_fetch(&student()).await;
        assert_eq!(report.travel_compensation, DatasetStatus::Unavailable);
        assert_eq!(class_of(&report.material_aid), Some(Classification::Approved));
        assert_eq!(class_of(&report.housing_compensation), Some(Classification::Approved));
        assert_eq!(fetcher.fetch_count(), 3);

        // The degraded report was not cached: the failing dataset is retried
        // while the healthy ones are still served from the sheet cache.
        let again = checker.get_or_fetch(&student()).await;
        assert_eq!(again.travel_compensation, DatasetStatus::Unavailable);
        assert_eq!(fetcher.fetch_count(), 4);
    }
}
