fn main() -> dagchain_node::Result<()> {
    dagchain_node::run()
}
