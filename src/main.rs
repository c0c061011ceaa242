use hospdb::cli;

fn main() {
    let status = cli::main_with_args(std::env::args().skip(1));
    std::process::exit(status);
}
