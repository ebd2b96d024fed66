use sim_lib::memory::cache::CachePolicy;
use sim_lib::memory::replacement::ReplacementPolicy;
use sim_lib::run_wrapper::{fetch_operations, init_logging, simulate_trace, trace_memory_size};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(false);
    let param_tokens: Vec<String> = std::env::args().collect();
    let trace_path =
        param_tokens.get(1).ok_or("You should specify exactly one trace file")?;
    let trace_base_name = trace_path.rsplit('/').next().unwrap_or(trace_path);
    std::fs::create_dir_all("eval")?;
    let output_path = format!("eval/policy_eval_{}.csv", trace_base_name);

    let operations = fetch_operations(trace_path)?;
    let memory_size = trace_memory_size(&operations);

    let mut writer = csv::Writer::from_path(output_path)?;
    writer.write_record([
        "Policy",
        "Ways",
        "Hits",
        "Misses",
        "Evictions",
        "Write-backs",
        "Miss rate",
    ])?;

    // Same capacity throughout, only the set layout and victim choice change
    for policy in ReplacementPolicy::ALL {
        for n_way in [1, 2, 4, 8] {
            let cache = simulate_trace(
                &operations,
                CachePolicy::make(32, 1, n_way, policy),
                memory_size,
            )?;
            let history = cache.history;
            writer.write_record(&[
                policy.to_string(),
                n_way.to_string(),
                history.num_hit.to_string(),
                history.num_miss.to_string(),
                history.num_eviction.to_string(),
                history.num_write_back.to_string(),
                format!("{:.4}", history.get_miss_rate()),
            ])?;
        }
    }
    writer.flush()?;

    Ok(())
}
