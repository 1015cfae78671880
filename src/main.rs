fn main() {
    hextrix_terminal_lib::run()
}
