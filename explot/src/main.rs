use std::{
    error::Error,
    fs::{
        self,
        DirEntry,
    },
    path::{
        Path,
        PathBuf,
    },
};

use clap::Parser;
use log::{
    error,
    info,
    warn,
};
use plotters::{
    self,
    prelude::*,
};
use serde::Deserialize;

/// Plots the exploitability logs written by `tree_solver --log-path`.
#[derive(Parser)]
struct AppArgs {
    /// Every sub directory becomes one graph with a line per CSV file
    #[clap(long, value_parser, default_value = "./logs")]
    logs: PathBuf,

    #[clap(long, value_parser, default_value = "./graphs")]
    graphs: PathBuf,

    /// Maximum number of points drawn per line
    #[clap(long, value_parser, default_value_t = 800)]
    max_points: usize,
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    iteration: u64,

    #[allow(dead_code)]
    elapsed_seconds: f64,
    exploitability: f64,
}

type Logs = Vec<(String, Vec<LogRecord>)>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = AppArgs::parse();
    fs::create_dir_all(&args.graphs)?;
    let paths = fs::read_dir(&args.logs)?;
    for path in paths {
        let path = path?;
        if !path.file_type()?.is_dir() {
            continue;
        }
        plot_dir(&path, &args)?;
    }
    Ok(())
}

fn plot_dir(dir: &DirEntry, args: &AppArgs) -> Result<(), Box<dyn std::error::Error>> {
    let logs = load_logs(dir, args.max_points);
    if logs.is_empty() {
        warn!("no log files in {}", dir.path().display());
        return Ok(());
    }
    let ((xmin, xmax), (ymin, ymax)) = logs_to_range(&logs);

    let img_path = args.graphs.join(dir.file_name()).with_extension("svg");
    let root_area = SVGBackend::new(&img_path, (1000, 800)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let caption = dir.path().display().to_string();
    let mut chart = ChartBuilder::on(&root_area)
        .caption(caption, ("sans-serif", 20).into_font())
        .margin(5)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(xmin..xmax, (ymin..ymax).log_scale())?;

    chart
        .configure_mesh()
        .y_desc("Exploitability")
        .y_label_formatter(&|y| format!("{:.1e}", y))
        .y_label_style(("sans-serif", 18).into_font())
        .x_desc("Iteration")
        .x_label_style(("sans-serif", 18).into_font())
        .draw()?;

    for (i, (name, log)) in logs.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.8);
        info!("plotting: {}", name);
        chart
            .draw_series(LineSeries::new(
                log.iter().map(|r| (r.iteration, r.exploitability)),
                color,
            ))?
            .label(name)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(1))
            });
    }

    chart
        .configure_series_labels()
        .background_style(WHITE)
        .border_style(BLACK)
        .label_font(("sans-serif", 18).into_font())
        .draw()?;

    root_area.present()?;
    info!("{} created", img_path.display());

    Ok(())
}

fn logs_to_range(logs: &Logs) -> ((u64, u64), (f64, f64)) {
    let mut xmin = u64::MAX;
    let mut xmax = u64::MIN;
    let mut ymin = f64::MAX;
    let mut ymax = f64::MIN;
    for (_name, log) in logs.iter() {
        for r in log {
            xmin = xmin.min(r.iteration);
            xmax = xmax.max(r.iteration);
            ymin = ymin.min(r.exploitability);
            ymax = ymax.max(r.exploitability);
        }
    }
    if xmin == xmax {
        xmax = xmin + 1;
    }
    if ymin == ymax {
        ymax = ymin * 10.0;
    }
    ((xmin, xmax), (ymin, ymax))
}

fn load_logs(dir: &DirEntry, max_points: usize) -> Logs {
    let mut v = vec![];
    let paths = match fs::read_dir(dir.path()) {
        Ok(p) => p,
        Err(err) => {
            error!("Failed to read dir: {}", err);
            return v;
        }
    };
    for path in paths.flatten() {
        let path = path.path();
        if path.extension().map_or(true, |ext| ext != "csv") {
            continue;
        }
        match load_log(&path) {
            Ok(data) if !data.is_empty() => {
                let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
                v.push((name, limit_len(data, max_points)));
            }
            Ok(_) => warn!("{} has no positive exploitability to plot", path.display()),
            Err(err) => error!("Failed to load {}: {}", path.display(), err),
        }
    }
    v.sort_by(|a, b| a.0.cmp(&b.0));
    v
}

/// Reads a CSV log. Values that cannot be drawn on a log scale are dropped.
fn load_log(path: &Path) -> Result<Vec<LogRecord>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut v = vec![];
    for r in reader.deserialize() {
        let r: LogRecord = r?;
        if r.exploitability > 0.0 {
            v.push(r);
        }
    }
    Ok(v)
}

fn limit_len(v: Vec<LogRecord>, max: usize) -> Vec<LogRecord> {
    if v.len() <= max {
        return v;
    }

    let mut new_v = Vec::with_capacity(max);
    let step = v.len() as f64 / max as f64;
    let mut next = 0.0f64;
    for (i, elem) in v.into_iter().enumerate() {
        if (i + 1) > next as usize {
            new_v.push(elem);
            next += step;
        }
    }
    new_v
}
