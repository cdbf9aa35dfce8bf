use kube::CustomResourceExt;
use pg_failover_operator::crd::Pgtask;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Pgtask::crd())?);
    Ok(())
}
