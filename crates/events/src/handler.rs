/// Execute an aggregate command in memory: decide, then evolve.
///
/// Used by domain unit tests and anywhere a command must be run without a store.
/// For persisted execution use the dispatcher in `ajo-infra`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: ajo_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
