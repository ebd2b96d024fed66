use sim_lib::memory::cache::CachePolicy;
use sim_lib::memory::replacement::ReplacementPolicy;
use sim_lib::run_wrapper::{fetch_operations, init_logging, simulate_trace, trace_memory_size};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(false);
    let param_tokens: Vec<String> = std::env::args().collect();
    let trace_path =
        param_tokens.get(1).ok_or("You should specify exactly one trace file")?;
    let operations = fetch_operations(trace_path)?;
    let memory_size = trace_memory_size(&operations);

    // Plot line series for each replacement policy
    // For a fixed capacity, vary the associativity
    // Performance metric: miss rate
    let cache_size = 64;
    let ways = vec![1, 2, 4, 8, 16];

    // Propagate the data
    let mut data: Vec<Vec<(usize, f64)>> = vec![vec![]; ReplacementPolicy::ALL.len()];
    let mut y_max: f64 = 0.;
    for (i, policy) in ReplacementPolicy::ALL.iter().enumerate() {
        for n_way in ways.iter() {
            let cache_policy = CachePolicy::make(cache_size, 1, *n_way, *policy);
            let cache = simulate_trace(&operations, cache_policy, memory_size)?;
            let miss_rate = cache.history.get_miss_rate();
            data[i].push((*n_way, miss_rate));
            y_max = y_max.max(miss_rate);
        }
    }
    // Plot the data
    use plotters::prelude::*;

    let trace_base_name = trace_path.rsplit('/').next().unwrap_or(trace_path);
    let plot_title = format!("Associativity evaluation (miss rate): {}", trace_base_name);
    std::fs::create_dir_all("eval")?;
    let output_path = format!("eval/assoc_eval_{}.svg", trace_base_name);

    let root = SVGBackend::new(output_path.as_str(), (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(1..16, 0.0..(y_max * 1.1).max(0.1))?;
    ctx.configure_mesh().x_desc("Associativity").y_desc("Miss rate").draw()?;

    for (i, policy) in ReplacementPolicy::ALL.iter().enumerate() {
        let series = data[i].iter().map(|(x, y)| (*x as i32, *y));
        let label = format!("Policy = {}", policy);
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series, color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;

    Ok(())
}
