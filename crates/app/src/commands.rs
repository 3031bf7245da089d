use anyhow::{bail, Context, Result};
use billcal_core::{
    project_payoff, BackupPayload, DebtAccount, Money, OccurrenceId, PayoffStrategy, Schedule, ScheduleId,
};
use billcal_import::{
    learn_rule, parse_rules_toml, CategoryRule, ColumnMapping, ImportPipeline, ImportPreview, MappingField, ParseOptions,
    SourceKind, Transaction,
};
use chrono::{Duration, Local, NaiveDate};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::config;
use crate::AppState;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ── Schedules ──

pub async fn add_schedule(state: &AppState, schedule: Schedule) -> Result<()> {
    let id = billcal_storage::insert_schedule(&state.db, &schedule, state.config.horizon_months).await?;
    let occurrences = billcal_storage::get_occurrences_for_schedule(&state.db, id).await?;
    println!(
        "Added schedule {} '{}' with {} occurrence(s)",
        id.0,
        schedule.name,
        occurrences.len()
    );
    if let Some(next) = occurrences.iter().find(|o| o.date >= today()) {
        println!("Next due {} for {}", next.date, next.planned_amount);
    }
    Ok(())
}

pub async fn list_schedules(state: &AppState) -> Result<()> {
    let schedules = billcal_storage::get_schedules(&state.db).await?;
    if schedules.is_empty() {
        println!("No schedules yet");
        return Ok(());
    }
    println!("{:>4}  {:<24} {:<6} {:>12}  {:<11} {:<12} {}", "id", "name", "type", "amount", "start", "repeats", "category");
    for s in &schedules {
        let repeats = if s.frequency.is_recurring() && s.interval > 1 {
            format!("{} x{}", s.frequency.as_str(), s.interval)
        } else {
            s.frequency.as_str().to_string()
        };
        println!(
            "{:>4}  {:<24} {:<6} {:>12}  {:<11} {:<12} {}",
            s.id.map(|id| id.0).unwrap_or_default(),
            s.name,
            s.entry_type.as_str(),
            s.amount.to_string(),
            s.start_date.to_string(),
            repeats,
            s.category
        );
    }
    Ok(())
}

/// With `from`, occurrences before that date are kept; otherwise every
/// occurrence is discarded and regenerated from the start date.
pub async fn regenerate_schedule(
    state: &AppState,
    id: i64,
    from: Option<NaiveDate>,
    months: Option<u32>,
) -> Result<()> {
    let id = ScheduleId(id);
    let months = months.unwrap_or(state.config.horizon_months);
    let count = match from {
        Some(from) => billcal_storage::regenerate_from(&state.db, id, months, from).await?,
        None => {
            let schedule = billcal_storage::get_schedule(&state.db, id)
                .await?
                .with_context(|| format!("schedule {} not found", id.0))?;
            billcal_storage::update_schedule(&state.db, &schedule, months).await?
        }
    };
    println!("Regenerated {count} occurrence(s) for schedule {}", id.0);
    Ok(())
}

pub async fn delete_schedule(state: &AppState, id: i64) -> Result<()> {
    if !billcal_storage::delete_schedule(&state.db, ScheduleId(id)).await? {
        bail!("schedule {id} not found");
    }
    println!("Deleted schedule {id} and its occurrences");
    Ok(())
}

// ── Occurrences ──

/// Last day of an `upcoming` window starting today.
pub fn upcoming_end(today: NaiveDate, days: i64) -> Result<NaiveDate> {
    if days < 0 {
        bail!("--days cannot be negative, got {days}");
    }
    Duration::try_days(days)
        .and_then(|d| today.checked_add_signed(d))
        .with_context(|| format!("--days {days} reaches past the last supported date"))
}

pub async fn upcoming(state: &AppState, days: i64) -> Result<()> {
    let today = today();
    let flagged = billcal_storage::mark_missed_before(&state.db, today).await?;
    if flagged > 0 {
        tracing::info!(flagged, "marked overdue occurrences as missed");
    }

    let names: HashMap<ScheduleId, String> = billcal_storage::get_schedules(&state.db)
        .await?
        .into_iter()
        .filter_map(|s| s.id.map(|id| (id, s.name)))
        .collect();
    let until = upcoming_end(today, days)?;
    let occurrences = billcal_storage::get_occurrences_between(&state.db, today, until).await?;
    if occurrences.is_empty() {
        println!("Nothing due in the next {days} day(s)");
        return Ok(());
    }

    let mut outstanding = Money::zero();
    println!("{:>5}  {:<11} {:<24} {:>12}  {}", "id", "date", "schedule", "amount", "status");
    for occ in &occurrences {
        let name = occ
            .schedule_id
            .and_then(|id| names.get(&id))
            .map(String::as_str)
            .unwrap_or("-");
        println!(
            "{:>5}  {:<11} {:<24} {:>12}  {}",
            occ.id.map(|id| id.0).unwrap_or_default(),
            occ.date.to_string(),
            name,
            occ.planned_amount.to_string(),
            occ.status.as_str()
        );
        outstanding += occ.outstanding();
    }
    println!("Outstanding: {outstanding}");
    Ok(())
}

async fn load_occurrence(state: &AppState, id: i64) -> Result<billcal_core::Occurrence> {
    billcal_storage::get_occurrence(&state.db, OccurrenceId(id))
        .await?
        .with_context(|| format!("occurrence {id} not found"))
}

pub async fn pay_occurrence(state: &AppState, id: i64, amount: Option<Money>, date: Option<NaiveDate>) -> Result<()> {
    let mut occ = load_occurrence(state, id).await?;
    let paid_on = date.unwrap_or_else(today);
    match amount {
        Some(amount) => occ.mark_paid(amount, paid_on)?,
        None => occ.mark_paid_in_full(paid_on),
    }
    billcal_storage::update_occurrence(&state.db, &occ).await?;
    println!(
        "Occurrence {id} {} ({} of {})",
        occ.status.as_str(),
        occ.paid_amount.unwrap_or_default(),
        occ.planned_amount
    );
    Ok(())
}

pub async fn skip_occurrence(state: &AppState, id: i64) -> Result<()> {
    let mut occ = load_occurrence(state, id).await?;
    occ.skip();
    billcal_storage::update_occurrence(&state.db, &occ).await?;
    println!("Skipped occurrence {id} on {}", occ.date);
    Ok(())
}

pub async fn snooze_occurrence(state: &AppState, id: i64, days: i64) -> Result<()> {
    let mut occ = load_occurrence(state, id).await?;
    occ.snooze(days)?;
    billcal_storage::update_occurrence(&state.db, &occ).await?;
    println!("Occurrence {id} now due {}", occ.date);
    Ok(())
}

pub async fn move_occurrence(state: &AppState, id: i64, date: NaiveDate) -> Result<()> {
    let mut occ = load_occurrence(state, id).await?;
    occ.reschedule(date);
    billcal_storage::update_occurrence(&state.db, &occ).await?;
    println!("Occurrence {id} moved to {date}");
    Ok(())
}

// ── Statement import ──

#[derive(Debug)]
pub struct ImportRequest {
    pub source: SourceKind,
    /// `field=header` corrections.
    pub maps: Vec<String>,
    pub remember: bool,
    /// `row=category[:profile]` corrections, rows numbered as in the preview.
    pub sets: Vec<String>,
    /// Turn every correction into a rule for future imports.
    pub learn: bool,
    pub commit: bool,
    pub delimiter: u8,
    pub quoting: bool,
}

/// Splits `field=header` into a mapping field and a header name.
pub fn parse_map_arg(arg: &str) -> Result<(MappingField, String)> {
    let (field, header) = arg
        .split_once('=')
        .with_context(|| format!("expected field=header, got '{arg}'"))?;
    let field: MappingField = field.parse().map_err(anyhow::Error::msg)?;
    Ok((field, header.trim().trim_matches('"').to_string()))
}

/// Applies `field=header` corrections on top of an inferred mapping.
/// Every named header must exist in the file.
pub fn apply_map_args(mut mapping: ColumnMapping, headers: &[String], maps: &[String]) -> Result<ColumnMapping> {
    for arg in maps {
        let (field, header) = parse_map_arg(arg)?;
        if !header.is_empty() && !headers.iter().any(|h| h.trim() == header) {
            bail!("no column named '{header}' (headers: {})", headers.join(", "));
        }
        mapping.set(field, &header);
    }
    Ok(mapping)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCorrection {
    /// 1-based, as printed in the preview.
    pub row: usize,
    pub category: String,
    pub profile: Option<String>,
}

/// Parses `row=category` or `row=category:profile`.
pub fn parse_set_arg(arg: &str) -> Result<RowCorrection> {
    let (row, target) = arg
        .split_once('=')
        .with_context(|| format!("expected row=category[:profile], got '{arg}'"))?;
    let row: usize = row
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a row number", row.trim()))?;
    if row == 0 {
        bail!("rows are numbered from 1");
    }
    let (category, profile) = match target.split_once(':') {
        Some((category, profile)) => (category.trim(), Some(profile.trim())),
        None => (target.trim(), None),
    };
    if category.is_empty() {
        bail!("no category given for row {row}");
    }
    Ok(RowCorrection {
        row,
        category: category.to_string(),
        profile: profile.filter(|p| !p.is_empty()).map(str::to_string),
    })
}

fn print_mapping(preview: &ImportPreview) {
    println!("Headers: {}", preview.headers().join(" | "));
    let origin = if preview.used_saved_mapping { "saved" } else { "detected" };
    println!("Mapping ({origin}):");
    for field in MappingField::ALL {
        let header = preview.mapping.get(field);
        println!("  {:<12} {}", field.as_str(), if header.is_empty() { "-" } else { header });
    }
}

fn print_transactions(rows: &[Transaction]) {
    println!(
        "{:>4}  {:<11} {:<36} {:>12}  {:<6} {:<26} {:<9} {}",
        "#", "date", "description", "amount", "dir", "category", "profile", "conf"
    );
    for (i, t) in rows.iter().enumerate() {
        let mut description: String = t.description.chars().take(36).collect();
        if !t.is_clean() {
            description = format!("! {}", description.chars().take(34).collect::<String>());
        }
        println!(
            "{:>4}  {:<11} {:<36} {:>12}  {:<6} {:<26} {:<9} {:.2}",
            i + 1,
            t.date_iso(),
            description,
            t.signed_amount.to_string(),
            t.direction.as_str(),
            t.category,
            t.profile,
            t.confidence
        );
    }
}

pub async fn import_statement(state: &AppState, file: &Path, request: ImportRequest) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rules = billcal_storage::get_category_rules(&state.db).await?;
    let saved = billcal_storage::get_csv_mappings(&state.db).await?;
    let pipeline = ImportPipeline::new(
        ParseOptions {
            delimiter: request.delimiter,
            quoting: request.quoting,
        },
        state.config.preview_rows,
    );

    let mut preview = pipeline.preview(&text, request.source, &rules, &saved);
    if preview.parsed.is_empty() {
        bail!("{} has no header row", file.display());
    }
    if !request.maps.is_empty() {
        let mapping = apply_map_args(preview.mapping.clone(), preview.headers(), &request.maps)?;
        preview = pipeline.reparse(preview, mapping, &rules);
    }

    println!("{} statement {file_name}: {} row(s)", request.source.label(), preview.parsed.rows.len());
    print_mapping(&preview);

    if preview.needs_mapping {
        let missing: Vec<&str> = preview.missing.iter().map(|f| f.as_str()).collect();
        println!("Mapping incomplete, missing: {}", missing.join(", "));
        println!("Correct it with --map field=header and run again.");
        if request.commit {
            bail!("cannot commit {file_name} until the column mapping is complete");
        }
        return Ok(());
    }

    if request.learn && request.sets.is_empty() {
        bail!("--learn needs at least one --set correction");
    }
    let corrections = request
        .sets
        .iter()
        .map(|arg| parse_set_arg(arg))
        .collect::<Result<Vec<_>>>()?;
    let total = preview.transactions.len();
    for c in &corrections {
        let fixed = preview
            .correct_row(c.row - 1, &c.category, c.profile.as_deref())
            .with_context(|| format!("row {} is out of range, the statement has {total} row(s)", c.row))?;
        let description = fixed.description.clone();
        if request.learn {
            let rule = learn_rule(&description, &c.category, c.profile.as_deref());
            let id = billcal_storage::save_category_rule(&state.db, &rule).await?;
            println!("Learned rule {id}: '{}' -> {}", rule.pattern, rule.category);
        }
    }

    print_transactions(preview.visible());
    if preview.transactions.len() > preview.visible().len() {
        println!("... {} more", preview.transactions.len() - preview.visible().len());
    }
    let degraded = preview.degraded_rows();
    if degraded > 0 {
        println!("{degraded} row(s) marked ! had cells that could not be read");
    }

    if request.remember {
        let mapping = preview.saved_mapping().context("serialize column mapping")?;
        billcal_storage::save_csv_mapping(&state.db, &mapping).await?;
        println!("Remembered this mapping for {} files with these headers", request.source.label());
    }

    if request.commit {
        let commit = preview.into_commit(&file_name);
        let inserted = billcal_storage::commit_import_batch(&state.db, &commit).await?;
        let skipped = commit.transactions.len() - inserted;
        if skipped == 0 {
            println!("{}", commit.summary());
        } else {
            println!("Saved {inserted} new row(s); {skipped} were already imported and were left alone.");
        }
        println!("Batch {}", commit.batch.id);
    } else {
        println!("Preview only; pass --commit to save.");
    }
    Ok(())
}

pub async fn list_batches(state: &AppState) -> Result<()> {
    let batches = billcal_storage::get_import_batches(&state.db).await?;
    if batches.is_empty() {
        println!("No imports yet");
        return Ok(());
    }
    for b in &batches {
        println!(
            "{}  {}  {:<10} {:>5} row(s)  {}",
            b.id,
            b.imported_at.format("%Y-%m-%d %H:%M"),
            b.source.key(),
            b.row_count,
            b.file_name
        );
    }
    Ok(())
}

pub async fn show_batch(state: &AppState, id: Uuid) -> Result<()> {
    let transactions = billcal_storage::get_batch_transactions(&state.db, id).await?;
    if transactions.is_empty() {
        bail!("batch {id} not found or empty");
    }
    print_transactions(&transactions);
    Ok(())
}

// ── Rules ──

pub async fn add_rule(state: &AppState, rule: CategoryRule) -> Result<()> {
    let id = billcal_storage::save_category_rule(&state.db, &rule).await?;
    println!(
        "Rule {id}: {} '{}' -> {}{}",
        rule.match_type.as_str(),
        rule.pattern,
        rule.category,
        rule.profile.as_deref().map(|p| format!(" ({p})")).unwrap_or_default()
    );
    Ok(())
}

pub async fn list_rules(state: &AppState) -> Result<()> {
    let rules = billcal_storage::get_category_rules(&state.db).await?;
    if rules.is_empty() {
        println!("No rules yet");
        return Ok(());
    }
    println!("{:>4}  {:>4}  {:<10} {:<30} {:<26} {}", "id", "prio", "match", "pattern", "category", "profile");
    for r in &rules {
        println!(
            "{:>4}  {:>4}  {:<10} {:<30} {:<26} {}{}",
            r.id.unwrap_or_default(),
            r.priority,
            r.match_type.as_str(),
            r.pattern,
            r.category,
            r.profile.as_deref().unwrap_or("-"),
            if r.enabled { "" } else { "  (disabled)" }
        );
    }
    Ok(())
}

pub async fn load_rules(state: &AppState, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let rules = parse_rules_toml(&content).with_context(|| format!("parse {}", file.display()))?;
    for rule in &rules {
        billcal_storage::save_category_rule(&state.db, rule).await?;
    }
    println!("Loaded {} rule(s) from {}", rules.len(), file.display());
    Ok(())
}

pub async fn delete_rule(state: &AppState, id: i64) -> Result<()> {
    if !billcal_storage::delete_category_rule(&state.db, id).await? {
        bail!("rule {id} not found");
    }
    println!("Deleted rule {id}");
    Ok(())
}

// ── Debts ──

pub async fn add_debt(state: &AppState, debt: DebtAccount) -> Result<()> {
    if let Some(day) = debt.due_day {
        if !(1..=31).contains(&day) {
            bail!("due day must be between 1 and 31, got {day}");
        }
    }
    let id = billcal_storage::save_debt_account(&state.db, &debt).await?;
    println!("Added debt account {id} '{}' ({})", debt.name, debt.balance);
    Ok(())
}

pub async fn list_debts(state: &AppState) -> Result<()> {
    let debts = billcal_storage::get_debt_accounts(&state.db).await?;
    if debts.is_empty() {
        println!("No debt accounts yet");
        return Ok(());
    }
    for d in &debts {
        println!(
            "{:>4}  {:<20} {:>12}  apr {:>6}  min {:>10}  due {:>2}{}",
            d.id.map(|id| id.0).unwrap_or_default(),
            d.name,
            d.balance.to_string(),
            d.apr.map(|a| format!("{a}%")).unwrap_or_else(|| "-".into()),
            d.min_payment.map(|m| m.to_string()).unwrap_or_else(|| "-".into()),
            d.due_day.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            if d.active { "" } else { "  (inactive)" }
        );
    }
    Ok(())
}

pub async fn plan_debts(state: &AppState, strategy: PayoffStrategy, extra: Money) -> Result<()> {
    if extra.is_negative() {
        bail!("extra payment cannot be negative");
    }
    let debts = billcal_storage::get_debt_accounts(&state.db).await?;
    let projection = project_payoff(&debts, extra, strategy);
    println!("{}", strategy.note());
    for (i, d) in billcal_core::sort_debts(&debts, strategy).ordered.iter().enumerate() {
        println!("  {}. {} {}", i + 1, d.name, d.balance);
    }
    if projection.months == 0 {
        println!("No minimum or extra payments set; nothing to project.");
    } else if projection.capped {
        println!(
            "Still in debt after {} months (interest so far {})",
            projection.months, projection.total_interest
        );
    } else {
        println!(
            "Debt free in {} month(s), paying {} in interest",
            projection.months, projection.total_interest
        );
    }
    Ok(())
}

// ── Backup & config ──

pub async fn export_backup(state: &AppState, file: &Path) -> Result<()> {
    let payload = billcal_storage::export_backup(&state.db).await?;
    let json = payload.to_json().context("serialize backup")?;
    std::fs::write(file, json).with_context(|| format!("write {}", file.display()))?;
    println!(
        "Exported {} schedule(s), {} occurrence(s), {} debt account(s) to {}",
        payload.schedules.len(),
        payload.occurrences.len(),
        payload.debt_accounts.len(),
        file.display()
    );
    Ok(())
}

pub async fn import_backup(state: &AppState, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let payload = BackupPayload::from_json(&json).with_context(|| format!("parse {}", file.display()))?;
    billcal_storage::import_backup(&state.db, &payload).await?;
    println!(
        "Restored {} schedule(s), {} occurrence(s), {} debt account(s)",
        payload.schedules.len(),
        payload.occurrences.len(),
        payload.debt_accounts.len()
    );
    Ok(())
}

pub fn show_config(data_dir: &Path) -> Result<()> {
    let cfg = config::load_config(data_dir)?;
    println!("# {}", config::config_path(data_dir).display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use billcal_storage::create_memory_db;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn memory_state() -> AppState {
        AppState {
            db: create_memory_db().await.unwrap(),
            config: config::Config::default(),
        }
    }

    fn request(source: SourceKind) -> ImportRequest {
        ImportRequest {
            source,
            maps: Vec::new(),
            remember: false,
            sets: Vec::new(),
            learn: false,
            commit: false,
            delimiter: b',',
            quoting: false,
        }
    }

    // ── map arguments ──

    #[test]
    fn map_arg_splits_field_and_header() {
        let (field, header) = parse_map_arg("date=Posted On").unwrap();
        assert_eq!(field, MappingField::Date);
        assert_eq!(header, "Posted On");
    }

    #[test]
    fn map_arg_needs_equals_sign() {
        assert!(parse_map_arg("date").is_err());
        assert!(parse_map_arg("colour=Blue").is_err());
    }

    #[test]
    fn set_arg_reads_row_category_and_profile() {
        assert_eq!(
            parse_set_arg("3=groceries:uber").unwrap(),
            RowCorrection {
                row: 3,
                category: "groceries".into(),
                profile: Some("uber".into()),
            }
        );
        assert_eq!(parse_set_arg("1= dining ").unwrap().profile, None);
        assert!(parse_set_arg("0=dining").is_err());
        assert!(parse_set_arg("x=dining").is_err());
        assert!(parse_set_arg("2=").is_err());
    }

    #[test]
    fn upcoming_window_rejects_out_of_range_days() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(upcoming_end(today, 30).unwrap(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert!(upcoming_end(today, -1).is_err());
        assert!(upcoming_end(today, 100_000_000).is_err());
        assert!(upcoming_end(today, i64::MAX).is_err());
    }

    #[test]
    fn map_args_override_detected_columns() {
        let hs = headers(&["Posted On", "Narrative", "Amount"]);
        let detected = billcal_import::detect_mapping(&hs, None);
        assert!(!detected.is_complete());

        let fixed = apply_map_args(detected, &hs, &["date=Posted On".to_string()]).unwrap();
        assert_eq!(fixed.date, "Posted On");
        assert!(fixed.is_complete());
    }

    #[test]
    fn map_args_reject_unknown_headers() {
        let hs = headers(&["Date", "Description", "Amount"]);
        let detected = billcal_import::detect_mapping(&hs, None);
        assert!(apply_map_args(detected, &hs, &["amount=Total".to_string()]).is_err());
    }

    // ── import flow ──

    #[tokio::test]
    async fn commit_saves_batch_and_remembers_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state().await;
        let file = dir.path().join("march.csv");
        std::fs::write(
            &file,
            "Posted On,Narrative,Amount\n01/03/2024,Coffee Shop,-4.50\n02/03/2024,Salary,2500.00\n",
        )
        .unwrap();

        let mut req = request(SourceKind::Anz);
        req.maps = vec!["date=Posted On".into()];
        req.remember = true;
        req.commit = true;
        import_statement(&state, &file, req).await.unwrap();

        let batches = billcal_storage::get_import_batches(&state.db).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].row_count, 2);
        assert_eq!(batches[0].file_name, "march.csv");
        assert_eq!(billcal_storage::get_csv_mappings(&state.db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrections_are_committed_and_learned() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state().await;
        let file = dir.path().join("jan.csv");
        std::fs::write(
            &file,
            "Date,Description,Debit,Credit\n03/01/2024,Corner Bakery 12,6.20,\n05/01/2024,Salary,,2500.00\n",
        )
        .unwrap();

        let mut req = request(SourceKind::CommBank);
        req.sets = vec!["1=dining:shared".into()];
        req.learn = true;
        req.commit = true;
        import_statement(&state, &file, req).await.unwrap();

        let batch = billcal_storage::get_import_batches(&state.db).await.unwrap().remove(0);
        let saved = billcal_storage::get_batch_transactions(&state.db, batch.id).await.unwrap();
        assert_eq!(saved[0].category, "dining");
        assert_eq!(saved[0].profile, "shared");
        assert_eq!(saved[1].category, "uncategorised");

        let rules = billcal_storage::get_category_rules(&state.db).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].category, "dining");
        assert!(rules[0].matches("CORNER BAKERY 12 SYDNEY"));
    }

    #[tokio::test]
    async fn correction_outside_statement_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state().await;
        let file = dir.path().join("jan.csv");
        std::fs::write(&file, "Date,Description,Amount\n2024-01-03,Coffee,-4.50\n").unwrap();

        let mut req = request(SourceKind::Generic);
        req.sets = vec!["2=dining".into()];
        req.commit = true;
        assert!(import_statement(&state, &file, req).await.is_err());
        assert!(billcal_storage::get_import_batches(&state.db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committing_the_same_file_twice_stores_rows_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state().await;
        let file = dir.path().join("jan.csv");
        std::fs::write(&file, "Date,Description,Amount\n2024-01-03,Coffee,-4.50\n2024-01-04,Fuel,-60.00\n").unwrap();

        for _ in 0..2 {
            let mut req = request(SourceKind::Generic);
            req.commit = true;
            import_statement(&state, &file, req).await.unwrap();
        }
        let mut counts: Vec<usize> = billcal_storage::get_import_batches(&state.db)
            .await
            .unwrap()
            .iter()
            .map(|b| b.row_count)
            .collect();
        counts.sort();
        assert_eq!(counts, vec![0, 2]);
    }

    #[tokio::test]
    async fn incomplete_mapping_blocks_commit() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state().await;
        let file = dir.path().join("odd.csv");
        std::fs::write(&file, "When,What,How Much\n01/03/2024,Coffee,4.50\n").unwrap();

        let mut req = request(SourceKind::Generic);
        req.commit = true;
        assert!(import_statement(&state, &file, req).await.is_err());
        assert!(billcal_storage::get_import_batches(&state.db).await.unwrap().is_empty());
    }

    // ── occurrences ──

    #[tokio::test]
    async fn pay_and_snooze_update_stored_occurrence() {
        let state = memory_state().await;
        let start = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let schedule = Schedule::new(
            "Rent",
            billcal_core::EntryType::Debt,
            Money::from_cents(1_800_00),
            start,
            billcal_core::Frequency::Monthly,
        );
        let id = billcal_storage::insert_schedule(&state.db, &schedule, 1).await.unwrap();
        let occs = billcal_storage::get_occurrences_for_schedule(&state.db, id).await.unwrap();
        let first = occs[0].id.unwrap().0;
        let second = occs[1].id.unwrap().0;

        pay_occurrence(&state, first, Some(Money::from_cents(900_00)), Some(start))
            .await
            .unwrap();
        snooze_occurrence(&state, second, 3).await.unwrap();

        let occs = billcal_storage::get_occurrences_for_schedule(&state.db, id).await.unwrap();
        assert_eq!(occs[0].status, billcal_core::OccurrenceStatus::Partial);
        assert_eq!(occs[0].outstanding(), Money::from_cents(900_00));
        assert_eq!(occs[1].date, NaiveDate::from_ymd_opt(2024, 2, 13).unwrap());
    }

    #[tokio::test]
    async fn snooze_beyond_calendar_is_an_error() {
        let state = memory_state().await;
        let schedule = Schedule::new(
            "Gym",
            billcal_core::EntryType::Debt,
            Money::from_cents(30_00),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            billcal_core::Frequency::None,
        );
        let id = billcal_storage::insert_schedule(&state.db, &schedule, 1).await.unwrap();
        let occ = billcal_storage::get_occurrences_for_schedule(&state.db, id).await.unwrap().remove(0);
        assert!(snooze_occurrence(&state, occ.id.unwrap().0, 100_000_000).await.is_err());
        let stored = billcal_storage::get_occurrence(&state.db, occ.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.date, occ.date);
    }

    #[tokio::test]
    async fn unknown_occurrence_is_an_error() {
        let state = memory_state().await;
        assert!(skip_occurrence(&state, 42).await.is_err());
    }

    // ── backup ──

    #[tokio::test]
    async fn backup_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state().await;
        billcal_storage::save_debt_account(&state.db, &DebtAccount::new("Visa", Money::from_cents(400_00)))
            .await
            .unwrap();
        let file = dir.path().join("backup.json");
        export_backup(&state, &file).await.unwrap();

        let restored = memory_state().await;
        import_backup(&restored, &file).await.unwrap();
        assert_eq!(billcal_storage::get_debt_accounts(&restored.db).await.unwrap().len(), 1);
    }
}
