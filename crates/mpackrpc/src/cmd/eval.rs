use crate::cmd::EvalArgs;
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_result, OutputFormat};

pub fn run(args: EvalArgs, format: OutputFormat) -> CliResult<i32> {
    let nvim = args.connect.connect()?;
    let value = nvim
        .eval(&args.expr)
        .map_err(|err| client_error("eval failed", err))?;
    print_result("nvim_eval", &value, format);
    let _ = nvim.close();
    Ok(SUCCESS)
}
