use crate::model::{Class, Department, Gender, LateRecord, LateStatus, Student};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// In-period counts strictly above this value are flagged.
pub const DEFAULT_WARNING_THRESHOLD: usize = 3;
pub const DEFAULT_TOP_COUNT: usize = 10;
/// Longest range, in buckets, a day or month series is built for.
pub const MAX_DAY_BUCKETS: usize = 366;
pub const MAX_MONTH_BUCKETS: usize = 120;

/// Inclusive calendar-day range. `to == None` means the single day `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn last_day(&self) -> NaiveDate {
        self.to.unwrap_or(self.from)
    }

    /// `from` floored to 00:00:00.000 and the last day ceiled to 23:59:59.999.
    /// `None` for an inverted range.
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let last = self.last_day();
        if self.from > last {
            return None;
        }
        let start = self.from.and_hms_opt(0, 0, 0)?;
        let end = last.and_hms_milli_opt(23, 59, 59, 999)?;
        Some((start, end))
    }

    /// Calendar days covered; 0 when inverted.
    pub fn day_count(&self) -> usize {
        let days = (self.last_day() - self.from).num_days();
        if days < 0 {
            0
        } else {
            days as usize + 1
        }
    }

    /// Calendar months touched; 0 when inverted.
    pub fn month_count(&self) -> usize {
        let last = self.last_day();
        if self.from > last {
            return 0;
        }
        let index = |d: NaiveDate| i64::from(d.year()) * 12 + i64::from(d.month0());
        (index(last) - index(self.from)) as usize + 1
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.bounds()
            .map(|(start, end)| t >= start && t <= end)
            .unwrap_or(false)
    }

    pub fn contains_record(&self, record: &LateRecord) -> bool {
        record.instant().map(|t| self.contains(t)).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub date_range: Option<DateRange>,
    pub department_id: Option<String>,
    pub class_id: Option<String>,
    pub mentor: Option<String>,
    pub status: Option<LateStatus>,
    pub gender: Option<Gender>,
    /// Matched case-insensitively; blank text matches everything.
    pub search_text: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn without_date(&self) -> Self {
        Self {
            date_range: None,
            ..self.clone()
        }
    }
}

/// Identity a late record is counted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StudentKey {
    Id(String),
    Name(String),
}

impl fmt::Display for StudentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentKey::Id(id) => write!(f, "{}", id),
            StudentKey::Name(name) => write!(f, "name:{}", name),
        }
    }
}

impl Serialize for StudentKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Indexed reference data: departments, classes and students.
pub struct Directory<'a> {
    departments: &'a [Department],
    classes: &'a [Class],
    students: &'a [Student],
    student_by_id: HashMap<&'a str, &'a Student>,
    students_by_name: HashMap<String, Vec<&'a Student>>,
    department_by_id: HashMap<&'a str, &'a Department>,
    class_by_id: HashMap<&'a str, &'a Class>,
}

impl<'a> Directory<'a> {
    pub fn new(departments: &'a [Department], classes: &'a [Class], students: &'a [Student]) -> Self {
        let mut students_by_name: HashMap<String, Vec<&'a Student>> = HashMap::new();
        for s in students {
            students_by_name.entry(name_key(&s.name)).or_default().push(s);
        }
        Self {
            departments,
            classes,
            students,
            student_by_id: students.iter().map(|s| (s.id.as_str(), s)).collect(),
            students_by_name,
            department_by_id: departments.iter().map(|d| (d.id.as_str(), d)).collect(),
            class_by_id: classes.iter().map(|c| (c.id.as_str(), c)).collect(),
        }
    }

    pub fn departments(&self) -> &'a [Department] {
        self.departments
    }

    pub fn classes(&self) -> &'a [Class] {
        self.classes
    }

    pub fn students(&self) -> &'a [Student] {
        self.students
    }

    pub fn department(&self, id: &str) -> Option<&'a Department> {
        self.department_by_id.get(id).copied()
    }

    pub fn class(&self, id: &str) -> Option<&'a Class> {
        self.class_by_id.get(id).copied()
    }

    pub fn student(&self, id: &str) -> Option<&'a Student> {
        self.student_by_id.get(id).copied()
    }

    /// Id first, then case-insensitive name. Among several students with the
    /// same name the one with the record's register number wins.
    pub fn resolve(&self, record: &LateRecord) -> Option<&'a Student> {
        if let Some(id) = record.student_id.as_deref() {
            if let Some(s) = self.student(id) {
                return Some(s);
            }
        }
        let key = name_key(&record.student_name);
        if key.is_empty() {
            return None;
        }
        let candidates = self.students_by_name.get(&key)?;
        let register_no = record.register_no.trim();
        candidates
            .iter()
            .find(|s| !register_no.is_empty() && s.register_no.trim().eq_ignore_ascii_case(register_no))
            .or_else(|| candidates.first())
            .copied()
    }

    pub fn student_key(&self, record: &LateRecord) -> StudentKey {
        if let Some(s) = self.resolve(record) {
            return StudentKey::Id(s.id.clone());
        }
        match record.student_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => StudentKey::Id(id.to_string()),
            _ => StudentKey::Name(name_key(&record.student_name)),
        }
    }
}

fn effective_gender(record: &LateRecord, student: Option<&Student>) -> Option<Gender> {
    record.gender.or(student.map(|s| s.gender))
}

fn matches_department(dir: &Directory<'_>, record: &LateRecord, student: Option<&Student>, id: &str) -> bool {
    match student {
        Some(s) => s.department_id == id,
        None => dir
            .department(id)
            .map(|d| d.name.trim().eq_ignore_ascii_case(record.department_name.trim()))
            .unwrap_or(false),
    }
}

fn matches_class(dir: &Directory<'_>, record: &LateRecord, student: Option<&Student>, id: &str) -> bool {
    match student {
        Some(s) => s.class_id == id,
        None => {
            let Some(class) = dir.class(id) else {
                return false;
            };
            class.name.trim().eq_ignore_ascii_case(record.class_name.trim())
                && matches_department(dir, record, None, &class.department_id)
        }
    }
}

pub fn record_matches(dir: &Directory<'_>, record: &LateRecord, criteria: &FilterCriteria) -> bool {
    if let Some(range) = criteria.date_range.as_ref() {
        if !range.contains_record(record) {
            return false;
        }
    }
    if let Some(status) = criteria.status {
        if record.status != status {
            return false;
        }
    }
    if let Some(needle) = criteria.search_text.as_deref() {
        let needle = needle.trim().to_lowercase();
        let hit = needle.is_empty()
            || record.student_name.to_lowercase().contains(&needle)
            || record.register_no.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }

    let needs_student = criteria.department_id.is_some()
        || criteria.class_id.is_some()
        || criteria.mentor.is_some()
        || criteria.gender.is_some();
    if !needs_student {
        return true;
    }
    let student = dir.resolve(record);

    if let Some(id) = criteria.department_id.as_deref() {
        if !matches_department(dir, record, student, id) {
            return false;
        }
    }
    if let Some(id) = criteria.class_id.as_deref() {
        if !matches_class(dir, record, student, id) {
            return false;
        }
    }
    if let Some(mentor) = criteria.mentor.as_deref() {
        if student.and_then(|s| s.mentor.as_deref()) != Some(mentor) {
            return false;
        }
    }
    if let Some(gender) = criteria.gender {
        if effective_gender(record, student) != Some(gender) {
            return false;
        }
    }
    true
}

/// Logical AND of every set criterion; input order is preserved.
pub fn filter_records<'r>(
    dir: &Directory<'_>,
    records: &'r [LateRecord],
    criteria: &FilterCriteria,
) -> Vec<&'r LateRecord> {
    records
        .iter()
        .filter(|r| record_matches(dir, r, criteria))
        .collect()
}

pub fn lifetime_counts(dir: &Directory<'_>, records: &[LateRecord]) -> HashMap<StudentKey, usize> {
    let mut counts: HashMap<StudentKey, usize> = HashMap::new();
    for r in records {
        *counts.entry(dir.student_key(r)).or_default() += 1;
    }
    counts
}

/// All-time count for one student; never narrowed by a date filter.
pub fn lifetime_late_count(dir: &Directory<'_>, records: &[LateRecord], key: &StudentKey) -> usize {
    records.iter().filter(|r| dir.student_key(r) == *key).count()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningCounts {
    /// Record id -> N, where the record is its student's Nth late arrival in the window.
    pub by_record: HashMap<String, usize>,
    pub by_student: HashMap<StudentKey, usize>,
}

pub fn running_counts_in_period(
    dir: &Directory<'_>,
    records: &[LateRecord],
    range: &DateRange,
) -> RunningCounts {
    let mut in_range: Vec<(NaiveDateTime, &LateRecord)> = records
        .iter()
        .filter_map(|r| r.instant().filter(|t| range.contains(*t)).map(|t| (t, r)))
        .collect();
    in_range.sort_by_key(|(t, _)| *t);

    let mut out = RunningCounts::default();
    for (_, r) in in_range {
        let n = out.by_student.entry(dir.student_key(r)).or_default();
        *n += 1;
        out.by_record.insert(r.id.clone(), *n);
    }
    out
}

pub fn exceeds_threshold(count: usize, threshold: usize) -> bool {
    count > threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Timestamp,
    StudentName,
    RegisterNo,
    DepartmentName,
    ClassName,
    Gender,
    Status,
    MarkedBy,
    Mentor,
    LifetimeCount,
    PeriodCount,
}

impl SortKey {
    pub const ALL: [SortKey; 11] = [
        SortKey::Timestamp,
        SortKey::StudentName,
        SortKey::RegisterNo,
        SortKey::DepartmentName,
        SortKey::ClassName,
        SortKey::Gender,
        SortKey::Status,
        SortKey::MarkedBy,
        SortKey::Mentor,
        SortKey::LifetimeCount,
        SortKey::PeriodCount,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Timestamp => "timestamp",
            SortKey::StudentName => "studentName",
            SortKey::RegisterNo => "registerNo",
            SortKey::DepartmentName => "departmentName",
            SortKey::ClassName => "className",
            SortKey::Gender => "gender",
            SortKey::Status => "status",
            SortKey::MarkedBy => "markedBy",
            SortKey::Mentor => "mentor",
            SortKey::LifetimeCount => "lifetimeCount",
            SortKey::PeriodCount => "periodCount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortDir::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortDir::Desc)
        } else {
            None
        }
    }
}

/// A record joined with everything the table view derives from it.
#[derive(Debug, Clone)]
pub struct RecordRow<'r> {
    pub record: &'r LateRecord,
    pub student: Option<&'r Student>,
    pub lifetime_count: usize,
    pub period_count: Option<usize>,
}

impl<'r> RecordRow<'r> {
    pub fn mentor(&self) -> Option<&'r str> {
        self.student.and_then(|s| s.mentor.as_deref())
    }

    pub fn gender(&self) -> Option<Gender> {
        effective_gender(self.record, self.student)
    }

    pub fn is_warning(&self, threshold: usize) -> bool {
        self.period_count
            .map(|c| exceeds_threshold(c, threshold))
            .unwrap_or(false)
    }
}

/// Lifetime counts come from `all`; period counts from `all` within `period`.
pub fn annotate<'r>(
    dir: &Directory<'r>,
    all: &[LateRecord],
    selected: &[&'r LateRecord],
    period: Option<&DateRange>,
) -> Vec<RecordRow<'r>> {
    let lifetime = lifetime_counts(dir, all);
    let running = period.map(|range| running_counts_in_period(dir, all, range));
    selected
        .iter()
        .map(|&r| RecordRow {
            record: r,
            student: dir.resolve(r),
            lifetime_count: lifetime.get(&dir.student_key(r)).copied().unwrap_or(0),
            period_count: running.as_ref().and_then(|rc| rc.by_record.get(&r.id).copied()),
        })
        .collect()
}

fn compare_rows(key: SortKey, a: &RecordRow<'_>, b: &RecordRow<'_>) -> Ordering {
    match key {
        SortKey::Timestamp => a.record.instant().cmp(&b.record.instant()),
        SortKey::StudentName => cmp_text(&a.record.student_name, &b.record.student_name),
        SortKey::RegisterNo => cmp_text(&a.record.register_no, &b.record.register_no),
        SortKey::DepartmentName => cmp_text(&a.record.department_name, &b.record.department_name),
        SortKey::ClassName => cmp_text(&a.record.class_name, &b.record.class_name),
        SortKey::Gender => a.gender().cmp(&b.gender()),
        SortKey::Status => a.record.status.cmp(&b.record.status),
        SortKey::MarkedBy => cmp_text(&a.record.marked_by, &b.record.marked_by),
        SortKey::Mentor => match (a.mentor(), b.mentor()) {
            (Some(x), Some(y)) => cmp_text(x, y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        },
        SortKey::LifetimeCount => a.lifetime_count.cmp(&b.lifetime_count),
        SortKey::PeriodCount => a.period_count.cmp(&b.period_count),
    }
}

/// Stable: rows that compare equal keep their relative order in either direction.
pub fn sort_rows(rows: &mut [RecordRow<'_>], key: SortKey, dir: SortDir) {
    rows.sort_by(|a, b| {
        let ord = compare_rows(key, a, b);
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
}

pub fn sort_records<'r>(
    dir: &Directory<'r>,
    all: &[LateRecord],
    records: &[&'r LateRecord],
    period: Option<&DateRange>,
    key: SortKey,
    direction: SortDir,
) -> Vec<&'r LateRecord> {
    let mut rows = annotate(dir, all, records, period);
    sort_rows(&mut rows, key, direction);
    rows.into_iter().map(|row| row.record).collect()
}

/// Buckets ordered by count descending, ties by key ascending.
pub fn group_count<'r, K, I, F>(records: I, mut key_fn: F) -> Vec<(K, usize)>
where
    K: Ord,
    I: IntoIterator<Item = &'r LateRecord>,
    F: FnMut(&LateRecord) -> K,
{
    let mut buckets: BTreeMap<K, usize> = BTreeMap::new();
    for r in records {
        *buckets.entry(key_fn(r)).or_default() += 1;
    }
    let mut out: Vec<(K, usize)> = buckets.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Department,
    Gender,
    Status,
    Class,
    MarkedBy,
}

impl GroupBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "department" => Some(GroupBy::Department),
            "gender" => Some(GroupBy::Gender),
            "status" => Some(GroupBy::Status),
            "class" => Some(GroupBy::Class),
            "markedBy" => Some(GroupBy::MarkedBy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Department => "department",
            GroupBy::Gender => "gender",
            GroupBy::Status => "status",
            GroupBy::Class => "class",
            GroupBy::MarkedBy => "markedBy",
        }
    }

    pub fn key(self, dir: &Directory<'_>, record: &LateRecord) -> String {
        match self {
            GroupBy::Department => record.department_name.clone(),
            GroupBy::Gender => effective_gender(record, dir.resolve(record))
                .map(|g| g.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            GroupBy::Status => record.status.as_str().to_string(),
            GroupBy::Class => format!("{} {}", record.department_name, record.class_name),
            GroupBy::MarkedBy => record.marked_by.clone(),
        }
    }
}

pub fn group_by<'r, I>(dir: &Directory<'_>, records: I, by: GroupBy) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'r LateRecord>,
{
    group_count(records, |r| by.key(dir, r))
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

fn next_month(d: NaiveDate) -> Option<NaiveDate> {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
}

/// One bucket per calendar day of `range`, zero-filled, chronological.
/// Empty when the range is inverted or longer than `MAX_DAY_BUCKETS` days.
pub fn day_series<'r, I>(records: I, range: &DateRange) -> Vec<(NaiveDate, usize)>
where
    I: IntoIterator<Item = &'r LateRecord>,
{
    if range.bounds().is_none() || range.day_count() > MAX_DAY_BUCKETS {
        return Vec::new();
    }
    let mut buckets: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut day = Some(range.from);
    while let Some(d) = day.filter(|d| *d <= range.last_day()) {
        buckets.insert(d, 0);
        day = d.succ_opt();
    }
    for r in records {
        if let Some(t) = r.instant().filter(|t| range.contains(*t)) {
            if let Some(n) = buckets.get_mut(&t.date()) {
                *n += 1;
            }
        }
    }
    buckets.into_iter().collect()
}

/// One bucket per calendar month touched by `range` (keyed by its first day),
/// zero-filled, chronological. Only records inside `range` are counted.
/// Empty past `MAX_MONTH_BUCKETS` months.
pub fn month_series<'r, I>(records: I, range: &DateRange) -> Vec<(NaiveDate, usize)>
where
    I: IntoIterator<Item = &'r LateRecord>,
{
    if range.bounds().is_none() || range.month_count() > MAX_MONTH_BUCKETS {
        return Vec::new();
    }
    let last = first_of_month(range.last_day());
    let mut buckets: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut month = Some(first_of_month(range.from));
    while let Some(m) = month.filter(|m| *m <= last) {
        buckets.insert(m, 0);
        month = next_month(m);
    }
    for r in records {
        if let Some(t) = r.instant().filter(|t| range.contains(*t)) {
            if let Some(n) = buckets.get_mut(&first_of_month(t.date())) {
                *n += 1;
            }
        }
    }
    buckets.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopEntry {
    pub key: StudentKey,
    pub student_id: Option<String>,
    pub name: String,
    pub register_no: String,
    pub department_name: String,
    pub class_name: String,
    pub mentor: Option<String>,
    pub gender: Option<Gender>,
    pub count: usize,
}

/// Ranks by count descending, ties by name ascending. With `group_by_student`
/// records are attributed to their resolved student; otherwise they are
/// grouped by the name and register number stored on the record.
pub fn top_n(dir: &Directory<'_>, records: &[LateRecord], n: usize, group_by_student: bool) -> Vec<TopEntry> {
    let mut order: Vec<StudentKey> = Vec::new();
    let mut groups: HashMap<StudentKey, (usize, &LateRecord)> = HashMap::new();
    for r in records {
        let key = if group_by_student {
            dir.student_key(r)
        } else {
            StudentKey::Name(format!("{}#{}", name_key(&r.student_name), r.register_no.trim()))
        };
        match groups.get_mut(&key) {
            Some((count, latest)) => {
                *count += 1;
                if r.instant() > latest.instant() {
                    *latest = r;
                }
            }
            None => {
                order.push(key.clone());
                groups.insert(key, (1, r));
            }
        }
    }

    let mut out: Vec<TopEntry> = order
        .into_iter()
        .filter_map(|key| {
            let (count, latest) = groups.get(&key).copied()?;
            let student = if group_by_student { dir.resolve(latest) } else { None };
            Some(match student {
                Some(s) => TopEntry {
                    student_id: Some(s.id.clone()),
                    name: s.name.clone(),
                    register_no: s.register_no.clone(),
                    department_name: dir
                        .department(&s.department_id)
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| latest.department_name.clone()),
                    class_name: dir
                        .class(&s.class_id)
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| latest.class_name.clone()),
                    mentor: s.mentor.clone(),
                    gender: Some(s.gender),
                    count,
                    key,
                },
                None => TopEntry {
                    student_id: latest.student_id.clone(),
                    name: latest.student_name.clone(),
                    register_no: latest.register_no.clone(),
                    department_name: latest.department_name.clone(),
                    class_name: latest.class_name.clone(),
                    mentor: None,
                    gender: latest.gender,
                    count,
                    key,
                },
            })
        })
        .collect();

    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| cmp_text(&a.name, &b.name))
            .then_with(|| a.key.cmp(&b.key))
    });
    out.truncate(n);
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodSummary {
    pub total_records: usize,
    pub late_students: usize,
    pub boys: usize,
    pub girls: usize,
    pub department_counts: Vec<(String, usize)>,
}

/// Dashboard card numbers. Boys/girls count distinct students, not records.
pub fn summarize(dir: &Directory<'_>, records: &[&LateRecord]) -> PeriodSummary {
    let mut seen: HashSet<StudentKey> = HashSet::new();
    let mut boys = 0;
    let mut girls = 0;
    for r in records {
        if !seen.insert(dir.student_key(r)) {
            continue;
        }
        match effective_gender(r, dir.resolve(r)) {
            Some(Gender::Male) => boys += 1,
            Some(Gender::Female) => girls += 1,
            None => {}
        }
    }
    PeriodSummary {
        total_records: records.len(),
        late_students: seen.len(),
        boys,
        girls,
        department_counts: group_by(dir, records.iter().copied(), GroupBy::Department),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentGenderCount {
    pub department_name: String,
    pub boys: usize,
    pub girls: usize,
}

/// Reference departments first in their given order, then names only seen on
/// records alphabetically. Departments with no late arrivals are omitted.
pub fn department_gender_breakdown(dir: &Directory<'_>, records: &[&LateRecord]) -> Vec<DepartmentGenderCount> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for r in records {
        let entry = counts.entry(name_key(&r.department_name)).or_default();
        match effective_gender(r, dir.resolve(r)) {
            Some(Gender::Male) => entry.0 += 1,
            Some(Gender::Female) => entry.1 += 1,
            None => {}
        }
    }

    let mut out = Vec::new();
    for d in dir.departments() {
        if let Some((boys, girls)) = counts.remove(&name_key(&d.name)) {
            out.push(DepartmentGenderCount {
                department_name: d.name.clone(),
                boys,
                girls,
            });
        }
    }
    let mut rest: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, (boys, girls)) in rest {
        let display = records
            .iter()
            .find(|r| name_key(&r.department_name) == key)
            .map(|r| r.department_name.clone())
            .unwrap_or(key);
        out.push(DepartmentGenderCount {
            department_name: display,
            boys,
            girls,
        });
    }
    out.retain(|d| d.boys > 0 || d.girls > 0);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStrength {
    pub class_id: String,
    pub class_name: String,
    pub boys: usize,
    pub girls: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStrength {
    pub department_id: String,
    pub department_name: String,
    pub classes: Vec<ClassStrength>,
    pub boys: usize,
    pub girls: usize,
    pub total: usize,
}

/// Enrolment per class by gender, departments and classes by name.
pub fn class_strength(dir: &Directory<'_>) -> Vec<DepartmentStrength> {
    let mut departments: Vec<&Department> = dir.departments().iter().collect();
    departments.sort_by(|a, b| cmp_text(&a.name, &b.name));

    departments
        .into_iter()
        .map(|d| {
            let mut classes: Vec<&Class> = dir
                .classes()
                .iter()
                .filter(|c| c.department_id == d.id)
                .collect();
            classes.sort_by(|a, b| cmp_text(&a.name, &b.name));
            let classes: Vec<ClassStrength> = classes
                .into_iter()
                .map(|c| {
                    let members = dir.students().iter().filter(|s| s.class_id == c.id);
                    let (boys, girls) = members.fold((0, 0), |(b, g), s| match s.gender {
                        Gender::Male => (b + 1, g),
                        Gender::Female => (b, g + 1),
                    });
                    ClassStrength {
                        class_id: c.id.clone(),
                        class_name: c.name.clone(),
                        boys,
                        girls,
                        total: boys + girls,
                    }
                })
                .collect();
            let boys: usize = classes.iter().map(|c| c.boys).sum();
            let girls: usize = classes.iter().map(|c| c.girls).sum();
            DepartmentStrength {
                department_id: d.id.clone(),
                department_name: d.name.clone(),
                boys,
                girls,
                total: boys + girls,
                classes,
            }
        })
        .collect()
}

/// Year of study from a class name's leading roman numeral: "II-A", "III",
/// "I (Lateral)". Names without one (e.g. "Final") have no year.
pub fn year_of_study(class_name: &str) -> Option<u8> {
    let name = class_name.trim();
    let end = name
        .find(|c: char| c == '-' || c == '(' || c.is_whitespace())
        .unwrap_or(name.len());
    match name[..end].to_ascii_uppercase().as_str() {
        "I" => Some(1),
        "II" => Some(2),
        "III" => Some(3),
        "IV" => Some(4),
        _ => None,
    }
}

fn year_name(year: u8) -> String {
    let numeral = match year {
        1 => "I",
        2 => "II",
        3 => "III",
        4 => "IV",
        _ => return format!("Year {}", year),
    };
    format!("{} Year", numeral)
}

/// Batch labels per year of study. Index 0 is first year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub year_labels: Vec<String>,
    /// Department ids or names (case-insensitive) using `pg_year_labels`.
    pub pg_departments: Vec<String>,
    pub pg_year_labels: Vec<String>,
}

impl Default for BatchPlan {
    fn default() -> Self {
        let owned = |labels: &[&str]| labels.iter().map(|l| l.to_string()).collect();
        Self {
            year_labels: owned(&["2025-29", "2024-28", "2023-27", "2022-26"]),
            pg_departments: owned(&["MBA"]),
            pg_year_labels: owned(&["2026-27", "2025-26"]),
        }
    }
}

impl BatchPlan {
    fn is_postgraduate(&self, department: &Department) -> bool {
        self.pg_departments.iter().any(|p| {
            let p = p.trim();
            p.eq_ignore_ascii_case(department.id.trim()) || p.eq_ignore_ascii_case(department.name.trim())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchProgram {
    Undergraduate,
    Postgraduate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchClass {
    pub class_id: String,
    pub class_name: String,
    pub department_name: String,
    pub boys: usize,
    pub girls: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStrength {
    pub program: BatchProgram,
    pub batch: String,
    pub year_of_study: u8,
    pub year_name: String,
    pub classes: Vec<BatchClass>,
    pub boys: usize,
    pub girls: usize,
    pub total: usize,
}

/// Student strength grouped by admission batch. Every labelled batch is
/// present even when empty; classes without a year of study, or whose year
/// has no label, are left out.
pub fn batch_strength(dir: &Directory<'_>, plan: &BatchPlan) -> Vec<BatchStrength> {
    let mut batches: Vec<BatchStrength> = Vec::new();
    let mut push_program = |program: BatchProgram, labels: &[String]| {
        for (i, label) in labels.iter().enumerate() {
            let year = (i + 1) as u8;
            batches.push(BatchStrength {
                program,
                batch: label.clone(),
                year_of_study: year,
                year_name: year_name(year),
                classes: Vec::new(),
                boys: 0,
                girls: 0,
                total: 0,
            });
        }
    };
    push_program(BatchProgram::Undergraduate, &plan.year_labels);
    push_program(BatchProgram::Postgraduate, &plan.pg_year_labels);

    for class in dir.classes() {
        let Some(year) = year_of_study(&class.name) else {
            continue;
        };
        let department = dir.department(&class.department_id);
        let program = match department {
            Some(d) if plan.is_postgraduate(d) => BatchProgram::Postgraduate,
            _ => BatchProgram::Undergraduate,
        };
        let Some(batch) = batches
            .iter_mut()
            .find(|b| b.program == program && b.year_of_study == year)
        else {
            continue;
        };
        let (boys, girls) = dir
            .students()
            .iter()
            .filter(|s| s.class_id == class.id)
            .fold((0, 0), |(b, g), s| match s.gender {
                Gender::Male => (b + 1, g),
                Gender::Female => (b, g + 1),
            });
        batch.classes.push(BatchClass {
            class_id: class.id.clone(),
            class_name: class.name.clone(),
            department_name: department.map(|d| d.name.clone()).unwrap_or_else(|| "N/A".to_string()),
            boys,
            girls,
            total: boys + girls,
        });
        batch.boys += boys;
        batch.girls += girls;
        batch.total += boys + girls;
    }

    for batch in &mut batches {
        batch.classes.sort_by(|a, b| {
            cmp_text(&a.department_name, &b.department_name).then_with(|| cmp_text(&a.class_name, &b.class_name))
        });
    }
    batches
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
    pub warning_threshold: usize,
    pub top_count: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            sort_key: SortKey::Timestamp,
            sort_dir: SortDir::Desc,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            top_count: DEFAULT_TOP_COUNT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationResult<'r> {
    pub rows: Vec<RecordRow<'r>>,
    pub summary: PeriodSummary,
    pub by_gender: Vec<(String, usize)>,
    /// Lifetime ranking; the date range is ignored, other criteria apply.
    pub top_offenders: Vec<TopEntry>,
    pub day_series: Vec<(NaiveDate, usize)>,
    pub month_series: Vec<(NaiveDate, usize)>,
}

/// Everything a dashboard view needs for one set of criteria.
pub fn aggregate<'r>(
    dir: &Directory<'r>,
    records: &'r [LateRecord],
    criteria: &FilterCriteria,
    opts: &AggregateOptions,
) -> AggregationResult<'r> {
    let filtered = filter_records(dir, records, criteria);
    let mut rows = annotate(dir, records, &filtered, criteria.date_range.as_ref());
    sort_rows(&mut rows, opts.sort_key, opts.sort_dir);

    let undated: Vec<LateRecord> = filter_records(dir, records, &criteria.without_date())
        .into_iter()
        .cloned()
        .collect();
    let top_offenders = top_n(dir, &undated, opts.top_count, true);

    let (day_series, month_series) = match criteria.date_range.as_ref() {
        Some(range) => (
            day_series(filtered.iter().copied(), range),
            month_series(filtered.iter().copied(), range),
        ),
        None => (Vec::new(), Vec::new()),
    };

    AggregationResult {
        summary: summarize(dir, &filtered),
        by_gender: group_by(dir, filtered.iter().copied(), GroupBy::Gender),
        rows,
        top_offenders,
        day_series,
        month_series,
    }
}
