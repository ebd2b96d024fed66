use sim_lib::flags::SimArgs;
use sim_lib::run_wrapper;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args = SimArgs::from_env_or_exit();
    let policy = args.cpu_policy();
    let cache_policy = args.cache_policy();

    run_wrapper::init_logging(policy.verbose);

    if args.trace {
        run_wrapper::run_trace(&args.file, policy, cache_policy, args.memory_size)?;
    } else {
        run_wrapper::run(&args.file, args.entry(), policy, cache_policy)?;
    }

    Ok(())
}
