fn main() -> dirvana::SnafuReport<dirvana::error::Error> {
    dirvana::dirvana_main()
}
