fn main() {
    wbackdrop::run();
}
