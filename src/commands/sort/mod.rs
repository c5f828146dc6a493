mod assemble;
mod buckets;
mod candidates;
mod classify;
mod extract;
mod routes;
mod run;
mod sort_key;
mod summary;
#[cfg(test)]
mod tests;

pub(crate) use run::run;
