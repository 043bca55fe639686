use std::path::PathBuf;

use chrono::{Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};

use flowmetrics::{
    EngineOptions, FlowEngine, IngestFilter, MovingRangeMode, Period, Ticket, Workflow, DEFAULT_HISTOGRAM_BINS,
};

#[derive(Parser)]
#[command(name = "flowmetrics", about = "Flow metrics from ticket workflow timestamps")]
struct Cli {
    /// Service-data JSON export
    #[arg(long, short)]
    input: PathBuf,

    /// Comma-separated workflow states, terminal state last
    #[arg(long, value_delimiter = ',')]
    states: Option<Vec<String>>,

    /// Offset from UTC, in seconds, used to turn timestamps into days
    #[arg(long, conflicts_with = "local", allow_negative_numbers = true)]
    utc_offset: Option<i32>,

    /// Use this machine's current UTC offset
    #[arg(long)]
    local: bool,

    /// Drop repositories whose name ends with this (repeatable)
    #[arg(long = "remove-repo", value_name = "REPO")]
    remove_repos: Vec<String>,

    /// Drop tickets of this type (repeatable)
    #[arg(long = "remove-type", value_name = "TYPE")]
    remove_types: Vec<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily count of tickets in each state
    Cfd {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lead time of every delivered ticket
    LeadTime {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lead-time distribution in equal-width bins
    Histogram {
        /// Number of bins
        #[arg(long, default_value_t = DEFAULT_HISTOGRAM_BINS)]
        bins: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Differences between successive lead times
    MovingRange {
        /// Average same-day deliveries into one point per day
        #[arg(long)]
        per_day: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// XmR limits over a baseline period (e.g. 2023-Q1, 30d, 2023-01-02..2023-02-10)
    Limits {
        #[arg(long)]
        baseline: String,
        /// Average same-day deliveries into one point per day
        #[arg(long)]
        per_day: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Metrics at one point of the cumulative flow
    AsOf {
        /// Day (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Cumulative count, counted from the delivered band upward
        #[arg(long)]
        count: u64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Age of every ticket in the workflow
    Age {
        /// Measure at the end of this day instead of now (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Headline numbers
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let workflow = match &cli.states {
        Some(states) => Workflow::new(states.iter().map(|s| s.trim().to_string()))?,
        None => Workflow::default(),
    };
    let utc_offset = if cli.local {
        Local::now().offset().local_minus_utc()
    } else {
        cli.utc_offset.unwrap_or(0)
    };
    let mut options = EngineOptions::default().with_utc_offset(utc_offset);
    if matches!(
        cli.command,
        Commands::MovingRange { per_day: true, .. } | Commands::Limits { per_day: true, .. }
    ) {
        options = options.with_moving_range_mode(MovingRangeMode::PerDay);
    }
    let engine = FlowEngine::new(workflow, options)?;

    let filter = IngestFilter {
        removed_repos: cli.remove_repos.clone(),
        removed_ticket_types: cli.remove_types.iter().cloned().collect(),
    };
    let data = flowmetrics::ingest::load_service_data(&cli.input)?;
    let tickets = flowmetrics::ingest::into_tickets(data, engine.workflow(), &filter, &flowmetrics::LogSink);

    match cli.command {
        Commands::Cfd { json } => handle_cfd(&engine, &tickets, json)?,
        Commands::LeadTime { json } => handle_lead_time(&engine, &tickets, json)?,
        Commands::Histogram { bins, json } => handle_histogram(&engine, &tickets, bins, json)?,
        Commands::MovingRange { json, .. } => handle_moving_range(&engine, &tickets, json)?,
        Commands::Limits { baseline, json, .. } => handle_limits(&engine, &tickets, &baseline, json)?,
        Commands::AsOf { date, count, json } => handle_as_of(&engine, &tickets, date, count, json)?,
        Commands::Age { as_of, json } => handle_age(&engine, &tickets, as_of, json)?,
        Commands::Summary { json } => handle_summary(&engine, &tickets, json)?,
    }

    Ok(())
}

fn handle_cfd(engine: &FlowEngine, tickets: &[Ticket], json: bool) -> anyhow::Result<()> {
    let cfd = engine.cumulative_flow(tickets);
    if json {
        println!("{}", serde_json::to_string_pretty(&cfd)?);
        return Ok(());
    }
    let states = engine.workflow().states();
    println!("{:<12}{}", "date", states.iter().map(|s| format!("{s:>20}")).collect::<String>());
    for record in &cfd {
        let row: String = states.iter().map(|s| format!("{:>20}", record.count(s))).collect();
        println!("{:<12}{row}", record.date.to_string());
    }
    Ok(())
}

fn handle_lead_time(engine: &FlowEngine, tickets: &[Ticket], json: bool) -> anyhow::Result<()> {
    let lead_times = engine.lead_times(tickets);
    if json {
        println!("{}", serde_json::to_string_pretty(&lead_times)?);
        return Ok(());
    }
    println!("Lead times ({} delivered)", lead_times.len());
    for r in &lead_times {
        println!(
            "  {}  {:<16} {:>8.2} days  (from {})",
            r.delivered_date, r.ticket_id, r.lead_time, r.start_state
        );
    }
    print_summary(&engine.lead_time_summary(&lead_times));
    Ok(())
}

fn handle_histogram(engine: &FlowEngine, tickets: &[Ticket], bins: usize, json: bool) -> anyhow::Result<()> {
    let lead_times = engine.lead_times(tickets);
    let histogram = engine.lead_time_histogram(&lead_times, bins);
    if json {
        println!("{}", serde_json::to_string_pretty(&histogram)?);
        return Ok(());
    }
    println!("Lead-time histogram ({} delivered)", lead_times.len());
    for bin in &histogram {
        println!("  {:>8.2} .. {:>8.2}  {:>5}", bin.lower, bin.upper, bin.count);
    }
    Ok(())
}

fn handle_moving_range(engine: &FlowEngine, tickets: &[Ticket], json: bool) -> anyhow::Result<()> {
    let lead_times = engine.lead_times(tickets);
    let ranges = engine.moving_ranges(&lead_times)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ranges)?);
        return Ok(());
    }
    println!("Moving ranges ({})", ranges.len());
    for r in &ranges {
        let pair = match (&r.from_ticket, &r.to_ticket) {
            (Some(from), Some(to)) => format!("  {from} -> {to}"),
            _ => String::new(),
        };
        println!("  {} -> {}  {:>8.2}{pair}", r.from_date, r.to_date, r.value);
    }
    Ok(())
}

fn handle_limits(engine: &FlowEngine, tickets: &[Ticket], baseline: &str, json: bool) -> anyhow::Result<()> {
    let lead_times = engine.lead_times(tickets);
    let Some(last) = lead_times.iter().map(|r| r.delivered_date).max() else {
        anyhow::bail!("No delivered tickets in {} input tickets", tickets.len());
    };
    let period = Period::parse(baseline, last)?;
    let window = period.window()?;
    let xmr = engine.xmr_limits(&lead_times, &window)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&xmr)?);
        return Ok(());
    }
    println!("Baseline {period}: {} .. {}", window.start, window.end);
    println!("  Individuals ({} points):", xmr.individuals.sample_size);
    println!("    Center: {:.2} days", xmr.individuals.center);
    println!("    Upper:  {:.2} days", xmr.individuals.upper);
    match xmr.individuals.lower {
        Some(lower) => println!("    Lower:  {lower:.2} days"),
        None => println!("    Lower:  -"),
    }
    println!("  Moving range ({} points):", xmr.moving_range.sample_size);
    println!("    Average: {:.2} days", xmr.moving_range.center);
    println!("    Upper:   {:.2} days", xmr.moving_range.upper);
    Ok(())
}

fn handle_as_of(
    engine: &FlowEngine,
    tickets: &[Ticket],
    date: NaiveDate,
    count: u64,
    json: bool,
) -> anyhow::Result<()> {
    let cfd = engine.cumulative_flow(tickets);
    let metrics = engine.as_of(&cfd, date, count);
    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
        return Ok(());
    }
    let Some(m) = metrics else {
        println!("No data at {date} for count {count}");
        return Ok(());
    };
    println!("As of {} in '{}'", m.date, m.current_state);
    println!("  Cycle time: {}", days_or_dash(m.cycle_time));
    println!("  Lead time:  {}", days_or_dash(m.lead_time));
    println!("  WIP:        {}", m.wip);
    match m.throughput {
        Some(t) => println!("  Throughput: {t:.2} items/day"),
        None => println!("  Throughput: -"),
    }
    println!("  Per state:");
    for c in &m.cycle_times {
        let marker = if m.biggest_cycle_time.as_ref() == Some(c) { " *" } else { "" };
        println!("    {:<20} {}{marker}", c.state, days_or_dash(c.days));
    }
    Ok(())
}

fn handle_age(
    engine: &FlowEngine,
    tickets: &[Ticket],
    as_of: Option<NaiveDate>,
    json: bool,
) -> anyhow::Result<()> {
    let at = match as_of {
        Some(day) => {
            let end_of_day = day
                .and_hms_opt(23, 59, 59)
                .ok_or_else(|| anyhow::anyhow!("Invalid day: {day}"))?;
            engine
                .options()
                .offset()
                .from_local_datetime(&end_of_day)
                .single()
                .ok_or_else(|| anyhow::anyhow!("Ambiguous day: {day}"))?
                .timestamp()
        }
        None => Utc::now().timestamp(),
    };
    let ages = engine.work_item_ages(tickets, at);
    if json {
        println!("{}", serde_json::to_string_pretty(&ages)?);
        return Ok(());
    }
    println!("Work item age ({} tickets)", ages.len());
    for a in &ages {
        println!(
            "  {:<16} {:<20} {:>5} days  {}",
            a.ticket_id,
            a.current_state,
            a.age_days,
            a.ticket_type.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn handle_summary(engine: &FlowEngine, tickets: &[Ticket], json: bool) -> anyhow::Result<()> {
    let report = engine.report(tickets, &flowmetrics::LogSink);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("Tickets:   {}", report.tickets);
    println!("Delivered: {}", report.delivered);
    if let (Some(first), Some(last)) = (report.first_day, report.last_day) {
        println!("Range:     {first} .. {last}");
    }
    if let Some(wip) = report.wip {
        println!("WIP:       {wip}");
    }
    print_summary(&report.lead_time);
    if let Some(ref xmr) = report.limits {
        println!(
            "  Limits ({} .. {}): center {:.2}, upper {:.2}, lower {}",
            xmr.individuals.baseline_start,
            xmr.individuals.baseline_end,
            xmr.individuals.center,
            xmr.individuals.upper,
            xmr.individuals.lower.map_or("-".to_string(), |l| format!("{l:.2}")),
        );
    }
    Ok(())
}

fn print_summary(s: &flowmetrics::LeadTimeSummary) {
    println!("  Lead Time:");
    if let Some(avg) = s.average {
        println!("    Average: {avg:.1} days");
    }
    if let Some(median) = s.median {
        println!("    Median:  {median:.1} days");
    }
    if let Some(p85) = s.percentiles.p85 {
        println!("    P85:     {p85:.1} days");
    }
    if let Some(p95) = s.percentiles.p95 {
        println!("    P95:     {p95:.1} days");
    }
    if let (Some(min), Some(max)) = (s.min, s.max) {
        println!("    Range:   {min:.1} - {max:.1} days");
    }
}

fn days_or_dash(days: Option<i64>) -> String {
    days.map_or("-".to_string(), |d| format!("{d} days"))
}
