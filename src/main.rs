fn main() -> std::process::ExitCode {
    wingetsweep_lib::run()
}
