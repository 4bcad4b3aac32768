mod cli;
mod stages;

use wnv_etl::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}
