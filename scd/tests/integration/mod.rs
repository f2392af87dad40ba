mod history_queries_test;
mod merge_scenarios_test;
mod multi_run_test;
mod postgres_store_test;
mod store_faults_test;
