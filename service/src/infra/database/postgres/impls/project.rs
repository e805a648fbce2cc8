//! [`Document`]-related [`Database`] implementations.

use common::operations::{By, Select};
use itertools::Itertools as _;
use postgres_types::ToSql;
use tracerr::Traced;

use crate::infra::{
    database::{
        self,
        document::{Condition, Document, Filter, Path},
        postgres::Connection,
        Postgres,
    },
    Database,
};

impl<C> Database<Select<By<Vec<Document>, Filter>>> for Postgres<C>
where
    C: Connection + Sync,
{
    type Ok = Vec<Document>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Document>, Filter>>,
    ) -> Result<Self::Ok, Self::Err> {
        let filter = by.into_inner();

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        let clauses = filter
            .conditions()
            .iter()
            .map(|(path, cond)| {
                let path = json_path(*path);
                match cond {
                    Condition::Matches(pattern) => {
                        params.push(pattern);
                        format!(
                            "(document #>> '{path}') ~* ${}::TEXT",
                            params.len(),
                        )
                    }
                    Condition::ContainsAll(values) => {
                        params.push(values);
                        format!(
                            "COALESCE(document #> '{path}', '[]'::JSONB) \
                             @> to_jsonb(${}::TEXT[])",
                            params.len(),
                        )
                    }
                    Condition::NonEmpty => {
                        format!("COALESCE(document #>> '{path}', '') <> ''")
                    }
                }
            })
            .collect::<Vec<_>>();
        let clauses = if clauses.is_empty() {
            "TRUE".to_owned()
        } else {
            clauses.iter().join(" AND ")
        };

        let sql = format!(
            "\
            SELECT document \
            FROM projects \
            WHERE {clauses} \
            ORDER BY id",
        );
        Ok(self
            .query(sql.as_str(), &params)
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| row.get("document"))
            .collect())
    }
}

/// Formats the provided [`Path`] as a Postgres `JSONB` path literal.
///
/// [`Path`]s are static field names, so are safe to inline into SQL.
fn json_path(path: Path) -> String {
    format!("{{{}}}", path.segments().iter().join(","))
}
