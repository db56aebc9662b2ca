fn main() {
    sleeptrack_lib::run()
}
