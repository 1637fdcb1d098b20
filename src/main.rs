fn main() -> relaymq::Result<()> {
    relaymq::cli::main()
}
